//! Application capability interface and the application factory registry.
//!
//! Applications are opaque plugins attached to simulation units. The kernel
//! only knows them through the [`Application`] callbacks; how an application
//! is built from its configured name is up to an [`ApplicationFactory`].
//!
//! # Example
//!
//! ```
//! use cosim_kernel::application::{Application, ApplicationFactory, ApplicationRegistry};
//!
//! struct Beacon;
//! impl Application for Beacon {}
//!
//! let mut registry = ApplicationRegistry::new();
//! registry.register("Beacon", |_unit_id| Box::new(Beacon));
//!
//! assert!(registry.create("Beacon", "rsu_0").is_some());
//! assert!(registry.create("Missing", "rsu_0").is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AppError;
use crate::interaction::ApplicationInteraction;
use crate::objects::{
    BatteryData, ChargingStationData, InductionLoopInfo, LaneAreaDetectorInfo, TrafficLightGroupInfo,
    VehicleData,
};
use crate::unit::UnitContext;
use crate::v2x::{ReceivedV2xMessage, V2xMessage};

/// Result of an application callback.
pub type AppResult = Result<(), AppError>;

/// Callbacks an application may implement.
///
/// Every callback has a no-op default, so an application only implements the
/// hooks relevant to the unit kind it runs on. Returning an error aborts the
/// current time advance.
pub trait Application: Send {
    /// Called once when the unit starts its applications.
    fn on_startup(&mut self, _ctx: &mut UnitContext<'_>) -> AppResult {
        Ok(())
    }

    /// Called once when the unit is torn down.
    fn on_shutdown(&mut self, _ctx: &mut UnitContext<'_>) -> AppResult {
        Ok(())
    }

    /// A vehicle moved. `previous` is `None` on the first update.
    fn on_vehicle_updated(
        &mut self,
        _previous: Option<&VehicleData>,
        _updated: &VehicleData,
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        Ok(())
    }

    fn on_battery_updated(&mut self, _battery: &BatteryData, _ctx: &mut UnitContext<'_>) -> AppResult {
        Ok(())
    }

    fn on_charging_denied(&mut self, _charging_station_id: &str, _ctx: &mut UnitContext<'_>) -> AppResult {
        Ok(())
    }

    fn on_traffic_light_updated(
        &mut self,
        _info: &TrafficLightGroupInfo,
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        Ok(())
    }

    fn on_traffic_detectors_updated(
        &mut self,
        _induction_loops: &[InductionLoopInfo],
        _lane_area_detectors: &[LaneAreaDetectorInfo],
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        Ok(())
    }

    fn on_charging_station_updated(
        &mut self,
        _data: &ChargingStationData,
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        Ok(())
    }

    fn on_message_received(&mut self, _message: &ReceivedV2xMessage, _ctx: &mut UnitContext<'_>) -> AppResult {
        Ok(())
    }

    /// A message sent by this unit was acknowledged. An empty
    /// `negative_reasons` means the transmission succeeded.
    fn on_acknowledgement(
        &mut self,
        _message: &V2xMessage,
        _negative_reasons: &[String],
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        Ok(())
    }

    fn on_interaction_received(
        &mut self,
        _interaction: &ApplicationInteraction,
        _ctx: &mut UnitContext<'_>,
    ) -> AppResult {
        Ok(())
    }

    /// A self-scheduled application event fired.
    fn on_event(&mut self, _resource: &serde_json::Value, _ctx: &mut UnitContext<'_>) -> AppResult {
        Ok(())
    }
}

/// Builds application instances from their configured names.
pub trait ApplicationFactory: Send + Sync {
    /// Creates the application `name` for unit `unit_id`, or `None` if the
    /// name is unknown.
    fn create(&self, name: &str, unit_id: &str) -> Option<Box<dyn Application>>;
}

/// Type alias for application constructor functions.
pub type ApplicationConstructor = Arc<dyn Fn(&str) -> Box<dyn Application> + Send + Sync>;

/// A registry of application constructors keyed by name.
#[derive(Default)]
pub struct ApplicationRegistry {
    constructors: HashMap<String, ApplicationConstructor>,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an application constructor with the given name.
    ///
    /// The constructor receives the id of the unit the application is loaded on.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&str) -> Box<dyn Application> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&str) -> Box<dyn Application> + Send + Sync + 'static,
    {
        self.register(name, constructor);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.constructors.keys()
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.constructors.remove(name).is_some()
    }
}

impl ApplicationFactory for ApplicationRegistry {
    fn create(&self, name: &str, unit_id: &str) -> Option<Box<dyn Application>> {
        self.constructors.get(name).map(|constructor| constructor(unit_id))
    }
}

impl std::fmt::Debug for ApplicationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationRegistry")
            .field("registered", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
