//! Identifier-to-unit dispatch tables.
//!
//! The registry keeps one aggregate map over all units and one table per
//! [`UnitTable`]. Both are updated together, so a unit is always present in
//! exactly its own kind table and the aggregate map, or in neither.
//!
//! Units are stored behind a `parking_lot::Mutex` so that events for different
//! units can be dispatched from several worker threads.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::SharedTables;
use crate::error::{KernelError, KernelResult};
use crate::types::{SimTime, UnitId};
use crate::unit::{SimulationUnit, UnitOutput, UnitTable};

/// Shared, lockable handle to a registered unit.
pub type UnitHandle = Arc<Mutex<SimulationUnit>>;

/// Registry of live simulation units.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    all: BTreeMap<UnitId, UnitHandle>,
    tables: [BTreeMap<UnitId, UnitHandle>; 6],
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a unit.
    ///
    /// Fails with [`KernelError::DuplicateUnit`] if the id is taken by a unit
    /// of any kind; the registry is left unchanged in that case.
    pub fn add(&mut self, unit: SimulationUnit) -> KernelResult<UnitHandle> {
        let id = unit.id().to_string();
        if self.all.contains_key(&id) {
            return Err(KernelError::DuplicateUnit { id });
        }

        let table = unit.kind().table();
        let handle: UnitHandle = Arc::new(Mutex::new(unit));
        self.all.insert(id.clone(), handle.clone());
        self.tables[table.index()].insert(id.clone(), handle.clone());
        tracing::debug!(unit = %id, ?table, "registered unit");
        Ok(handle)
    }

    /// Looks up a unit. Absent units are expected and not an error.
    pub fn get(&self, id: &str) -> Option<UnitHandle> {
        self.all.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.all.contains_key(id)
    }

    /// Tears down and unregisters a unit. Returns `false` if the id is unknown.
    ///
    /// The unit is unregistered even if one of its applications fails on
    /// shutdown; that failure is returned afterwards.
    pub fn remove(
        &mut self,
        id: &str,
        time: SimTime,
        shared: &SharedTables,
        output: &mut UnitOutput,
    ) -> KernelResult<bool> {
        let Some(handle) = self.all.get(id).cloned() else {
            return Ok(false);
        };

        let (result, table) = {
            let mut unit = handle.lock();
            (unit.tear_down(time, shared, output), unit.kind().table())
        };
        self.all.remove(id);
        self.tables[table.index()].remove(id);
        tracing::debug!(unit = %id, "removed unit");
        result.map(|_| true)
    }

    /// Tears down every unit and clears all tables. Returns the number of
    /// units removed. A second call finds nothing left and returns 0.
    pub fn remove_all(
        &mut self,
        time: SimTime,
        shared: &SharedTables,
        output: &mut UnitOutput,
    ) -> KernelResult<usize> {
        let units = std::mem::take(&mut self.all);
        for table in self.tables.iter_mut() {
            table.clear();
        }

        let count = units.len();
        let mut first_error = None;
        for (id, handle) in units {
            if let Err(err) = handle.lock().tear_down(time, shared, output) {
                tracing::error!(unit = %id, "teardown failed: {}", err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    /// Ids of the units in `table`, in ascending order.
    pub fn ids_of(&self, table: UnitTable) -> Vec<UnitId> {
        self.tables[table.index()].keys().cloned().collect()
    }

    /// Handles of the units in `table`, in ascending id order.
    pub fn handles_of(&self, table: UnitTable) -> Vec<UnitHandle> {
        self.tables[table.index()].values().cloned().collect()
    }

    /// Handles of every unit, in ascending id order.
    pub fn handles(&self) -> Vec<UnitHandle> {
        self.all.values().cloned().collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &UnitId> {
        self.all.keys()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn len_of(&self, table: UnitTable) -> usize {
        self.tables[table.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{AppResult, Application};
    use crate::error::ErrorCode;
    use crate::interaction::{UnitMapping, VehicleMapping};
    use crate::objects::{VehicleClass, VehicleType};
    use crate::unit::UnitContext;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ShutdownCounter(Arc<AtomicUsize>);

    impl Application for ShutdownCounter {
        fn on_shutdown(&mut self, _ctx: &mut UnitContext<'_>) -> AppResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn rsu(name: &str) -> SimulationUnit {
        SimulationUnit::road_side_unit(&UnitMapping::new(name, vec!["App".to_string()]))
    }

    fn vehicle(name: &str, class: VehicleClass) -> SimulationUnit {
        SimulationUnit::vehicle(&VehicleMapping {
            name: name.to_string(),
            group: None,
            applications: vec!["App".to_string()],
            vehicle_type: VehicleType::new("t", class),
        })
    }

    #[test]
    fn test_add_and_get() {
        let mut registry = UnitRegistry::new();
        registry.add(rsu("rsu_0")).unwrap();
        registry.add(vehicle("veh_0", VehicleClass::ElectricVehicle)).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.len_of(UnitTable::RoadSideUnits), 1);
        assert_eq!(registry.len_of(UnitTable::Vehicles), 1);
        assert!(registry.get("veh_0").is_some());
        assert!(registry.get("veh_1").is_none());
    }

    #[test]
    fn test_duplicate_across_kinds() {
        let mut registry = UnitRegistry::new();
        registry.add(rsu("x")).unwrap();

        let err = registry.add(vehicle("x", VehicleClass::Car)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IdAlreadyAssigned);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.len_of(UnitTable::Vehicles), 0);
    }

    #[test]
    fn test_remove_tears_down() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let mut registry = UnitRegistry::new();
        let mut unit = rsu("rsu_0");
        unit.add_application("Counter", Box::new(ShutdownCounter(shutdowns.clone())));
        registry.add(unit).unwrap();

        let shared = SharedTables::default();
        let mut output = UnitOutput::default();
        assert!(registry.remove("rsu_0", 10, &shared, &mut output).unwrap());
        assert!(!registry.remove("rsu_0", 10, &shared, &mut output).unwrap());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.len_of(UnitTable::RoadSideUnits), 0);
    }

    #[test]
    fn test_remove_all_twice() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let mut registry = UnitRegistry::new();
        for name in ["a", "b", "c"] {
            let mut unit = rsu(name);
            unit.add_application("Counter", Box::new(ShutdownCounter(shutdowns.clone())));
            registry.add(unit).unwrap();
        }

        let shared = SharedTables::default();
        let mut output = UnitOutput::default();
        assert_eq!(registry.remove_all(100, &shared, &mut output).unwrap(), 3);
        assert_eq!(registry.remove_all(100, &shared, &mut output).unwrap(), 0);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 3);
        for table in UnitTable::ALL {
            assert_eq!(registry.len_of(table), 0);
        }
    }

    #[test]
    fn test_ids_are_ordered() {
        let mut registry = UnitRegistry::new();
        for name in ["rsu_2", "rsu_0", "rsu_1"] {
            registry.add(rsu(name)).unwrap();
        }
        assert_eq!(registry.ids_of(UnitTable::RoadSideUnits), vec!["rsu_0", "rsu_1", "rsu_2"]);
        assert_eq!(registry.handles().len(), 3);
    }
}
