use super::dispatcher::{Dispatcher, HandlerResult, RawHandler, TopicEvent, TopicHandler};
use super::{ReyerClient, lock};

use crate::error::client::ClientError;
use crate::message::{BroadcastTopic, ProtocolEventMessage};
use crate::transport::SubscribeSocket;

use common::ErrorLocation;

use std::panic::Location;
use std::sync::Arc;

use log::{debug, info};
use tokio::time::timeout;

impl ReyerClient {
    /// Make sure the subscription dispatcher runs, optionally adding a raw
    /// handler that sees every broadcast frame undecoded.
    ///
    /// Independent of the request session: subscribing works while
    /// disconnected, and the dispatcher keeps running across request-side
    /// reconnects until [`disconnect`](Self::disconnect). If the runtime hangs
    /// up the publish pipe the dispatcher stops and [`is_subscribed`](Self::is_subscribed)
    /// turns false; calling `subscribe(None)` again redials it. Registered
    /// handlers are kept in both cases.
    pub async fn subscribe(&self, raw_handler: Option<RawHandler>) -> Result<(), ClientError> {
        self.ensure_dispatcher().await?;

        if let Some(handler) = raw_handler {
            self.inner.registry.add_raw_handler(handler);
            debug!("Raw broadcast handler registered");
        }

        Ok(())
    }

    /// Register a handler for one topic, starting the dispatcher if needed.
    ///
    /// Handlers of a topic run in registration order.
    pub async fn subscribe_to_topic(
        &self,
        topic: BroadcastTopic,
        handler: TopicHandler,
    ) -> Result<(), ClientError> {
        self.ensure_dispatcher().await?;
        self.inner.registry.add_topic_handler(topic, handler);
        info!("Subscribed to topic {topic:?}");
        Ok(())
    }

    pub async fn subscribe_protocol_events<F>(&self, handler: F) -> Result<(), ClientError>
    where
        F: Fn(&ProtocolEventMessage) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: TopicHandler = Arc::new(move |event: &TopicEvent| match event {
            TopicEvent::Protocol(message) => handler(message),
            TopicEvent::Log(_) => Ok(()),
        });

        self.subscribe_to_topic(BroadcastTopic::Protocol, handler).await
    }

    pub async fn subscribe_log<F>(&self, handler: F) -> Result<(), ClientError>
    where
        F: Fn(&str) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: TopicHandler = Arc::new(move |event: &TopicEvent| match event {
            TopicEvent::Log(line) => handler(line),
            TopicEvent::Protocol(_) => Ok(()),
        });

        self.subscribe_to_topic(BroadcastTopic::Log, handler).await
    }

    /// Drop one raw handler previously passed to [`subscribe`](Self::subscribe).
    ///
    /// Returns false if it was not registered.
    pub fn unsubscribe(&self, handler: &RawHandler) -> bool {
        let removed = self.inner.registry.remove_raw_handler(handler);
        if removed {
            debug!("Raw broadcast handler removed");
        }
        removed
    }

    /// Drop every raw handler. Topic handlers are kept.
    pub fn unsubscribe_raw(&self) {
        self.inner.registry.clear_raw_handlers();
    }

    /// True while a dispatcher is receiving broadcasts.
    pub fn is_subscribed(&self) -> bool {
        lock(&self.inner.dispatcher)
            .as_ref()
            .is_some_and(Dispatcher::is_running)
    }

    async fn ensure_dispatcher(&self) -> Result<(), ClientError> {
        let inner = &self.inner;

        // Serialises with connect and the teardown step of disconnect.
        let _session = inner.session.lock().await;

        if self.is_subscribed() {
            return Ok(());
        }

        let dial = SubscribeSocket::dial(&inner.publish_address);
        let socket = match timeout(inner.config.request_timeout, dial).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                return Err(ClientError::Subscription {
                    message: format!("cannot subscribe to {}: {e}", inner.publish_address),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            Err(_) => {
                return Err(ClientError::Subscription {
                    message: format!(
                        "subscribing to {} took longer than {:?}",
                        inner.publish_address, inner.config.request_timeout
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        let dispatcher = Dispatcher::spawn(
            socket,
            Arc::clone(&inner.registry),
            inner.config.receive_timeout,
        );

        // A previous dispatcher whose socket was lost is already finished.
        let finished = lock(&inner.dispatcher).replace(dispatcher);
        if let Some(finished) = finished {
            finished.shutdown(super::DISPATCHER_JOIN_TIMEOUT).await;
        }

        info!("Subscribed to broadcasts from {}", inner.publish_address);
        Ok(())
    }
}
