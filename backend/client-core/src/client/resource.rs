//! Resources the runtime can be asked for, with the payload shape of each.

use crate::message::{
    GraphicsSettings, MonitorInfo, PluginInfo, ProtocolRequest, ResourceCode, RuntimeState,
    TaskInfo,
};

use serde::de::DeserializeOwned;

/// A resource query: the code to send and the payload to expect back.
pub trait Resource {
    const CODE: ResourceCode;
    type Output: DeserializeOwned;
}

macro_rules! resource {
    ($(#[$meta:meta])* $name:ident => $code:ident, $output:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl Resource for $name {
            const CODE: ResourceCode = ResourceCode::$code;
            type Output = $output;
        }
    };
}

resource!(CurrentRuntimeState => RuntimeState, RuntimeState);
resource!(AvailableSources => AvailableSources, Vec<PluginInfo>);
resource!(AvailableStages => AvailableStages, Vec<PluginInfo>);
resource!(AvailableSinks => AvailableSinks, Vec<PluginInfo>);
resource!(AvailableTasks => AvailableTasks, Vec<PluginInfo>);
resource!(AvailableMonitors => AvailableMonitors, Vec<MonitorInfo>);
resource!(CurrentGraphicsSettings => CurrentGraphicsSettings, GraphicsSettings);
resource!(
    /// The protocol currently loaded in the runtime.
    CurrentProtocol => CurrentProtocol, ProtocolRequest
);
resource!(CurrentTask => CurrentTask, TaskInfo);
resource!(AvailableCalibrations => AvailableCalibrations, Vec<PluginInfo>);
resource!(AvailableFilters => AvailableFilters, Vec<PluginInfo>);
