//! Typed request operations.
//!
//! Each operation is the same template: send, decode the [`Response`]
//! envelope, turn `success == false` into [`ClientError::Rejected`], then
//! decode the payload where the operation returns one. Every failure is
//! logged here before it is returned.

use super::ReyerClient;
use super::resource::{
    AvailableCalibrations, AvailableFilters, AvailableMonitors, AvailableSinks, AvailableSources,
    AvailableStages, AvailableTasks, CurrentGraphicsSettings, CurrentProtocol, CurrentRuntimeState,
    CurrentTask, Resource,
};

use crate::error::client::ClientError;
use crate::message::{
    self, Command, CommandRequest, GraphicsSettings, GraphicsSettingsRequest, MonitorInfo, Ping,
    PipelineConfigRequest, PluginInfo, Pong, ProtocolRequest, Request, ResourceRequest, Response,
    RuntimeState, TaskInfo,
};

use common::ErrorLocation;

use std::panic::Location;

use log::{error, info};
use serde::de::DeserializeOwned;

impl ReyerClient {
    async fn execute(&self, request: impl Into<Request>) -> Result<Response, ClientError> {
        let request = request.into();
        let kind = request.kind();

        let reply = self.send_request(request).await?;

        let response: Response = message::decode(&reply).map_err(|e| {
            error!("Error decoding response to {kind}: {e}");
            ClientError::from(e)
        })?;

        if !response.success {
            error!(
                "Runtime rejected {kind} (code {}): {}",
                response.error_code, response.error_message
            );
            return Err(ClientError::Rejected {
                error_code: response.error_code,
                message: response.error_message,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(response)
    }

    async fn execute_for<T: DeserializeOwned>(
        &self,
        request: impl Into<Request>,
    ) -> Result<T, ClientError> {
        let request = request.into();
        let kind = request.kind();
        let response = self.execute(request).await?;

        if response.payload.is_empty() {
            error!("Response to {kind} carried no payload");
            return Err(ClientError::decode(format!(
                "response to {kind} carried no payload"
            )));
        }

        message::decode_str(&response.payload).map_err(|e| {
            error!("Error decoding {kind} payload: {e}");
            ClientError::from(e)
        })
    }

    /// Round-trip a ping. The runtime echoes the timestamp.
    pub async fn ping(&self, timestamp: u64) -> Result<Pong, ClientError> {
        self.execute_for(Ping { timestamp }).await
    }

    /// Ask for one resource, decoded to the shape that resource carries.
    pub async fn query<R: Resource>(&self) -> Result<R::Output, ClientError> {
        self.execute_for(ResourceRequest::new(R::CODE)).await
    }

    pub async fn get_runtime_state(&self) -> Result<RuntimeState, ClientError> {
        self.query::<CurrentRuntimeState>().await
    }

    pub async fn get_sources(&self) -> Result<Vec<PluginInfo>, ClientError> {
        self.query::<AvailableSources>().await
    }

    pub async fn get_stages(&self) -> Result<Vec<PluginInfo>, ClientError> {
        self.query::<AvailableStages>().await
    }

    pub async fn get_sinks(&self) -> Result<Vec<PluginInfo>, ClientError> {
        self.query::<AvailableSinks>().await
    }

    pub async fn get_tasks(&self) -> Result<Vec<PluginInfo>, ClientError> {
        self.query::<AvailableTasks>().await
    }

    pub async fn get_calibrations(&self) -> Result<Vec<PluginInfo>, ClientError> {
        self.query::<AvailableCalibrations>().await
    }

    pub async fn get_filters(&self) -> Result<Vec<PluginInfo>, ClientError> {
        self.query::<AvailableFilters>().await
    }

    pub async fn get_monitors(&self) -> Result<Vec<MonitorInfo>, ClientError> {
        self.query::<AvailableMonitors>().await
    }

    pub async fn get_graphics_settings(&self) -> Result<GraphicsSettings, ClientError> {
        self.query::<CurrentGraphicsSettings>().await
    }

    pub async fn get_current_protocol(&self) -> Result<ProtocolRequest, ClientError> {
        self.query::<CurrentProtocol>().await
    }

    pub async fn get_current_task(&self) -> Result<TaskInfo, ClientError> {
        self.query::<CurrentTask>().await
    }

    pub async fn send_pipeline_config(
        &self,
        config: PipelineConfigRequest,
    ) -> Result<(), ClientError> {
        self.execute(config).await?;
        info!("Pipeline config sent");
        Ok(())
    }

    pub async fn send_graphics_settings(
        &self,
        settings: GraphicsSettingsRequest,
    ) -> Result<(), ClientError> {
        self.execute(settings).await?;
        info!("Graphics settings sent");
        Ok(())
    }

    /// Send a command routed `client` → `graphics`.
    pub async fn send_command(&self, command: Command) -> Result<(), ClientError> {
        self.send_routed_command(CommandRequest::new(command)).await
    }

    pub async fn send_routed_command(&self, command: CommandRequest) -> Result<(), ClientError> {
        let name = command.command;
        self.execute(command).await?;
        info!("Command {name:?} sent");
        Ok(())
    }

    /// Submit a protocol for the runtime to load.
    ///
    /// The runtime rejects protocols without tasks.
    pub async fn send_protocol(&self, protocol: &ProtocolRequest) -> Result<(), ClientError> {
        self.execute(protocol.clone()).await?;
        info!(
            "Protocol '{}' sent with {} task(s)",
            protocol.name,
            protocol.tasks.len()
        );
        Ok(())
    }
}
