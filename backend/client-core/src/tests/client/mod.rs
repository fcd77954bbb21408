mod dispatcher;
mod notifier;
mod state;
