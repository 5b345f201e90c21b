use crate::grid::{CellList, Grid};
use crate::host::{ModuleHandle, ModuleId};
use crate::math::{heading_vector, Point3d, Vector3d};
use crate::{ManagedId, UnequippedId};

/// What a grid cell records about an entity overlapping it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Managed(ManagedId),
    Unequipped(UnequippedId),
}

/// The position, heading and occupied grid cells of a tracked vehicle.
///
/// The cells always match the position: every method that moves the vehicle
/// also re-registers it in the grid.
#[derive(Clone, Debug)]
pub struct HostPosition {
    /// The world coordinates of the vehicle.
    position: Point3d,
    /// A unit vector along the vehicle's heading.
    heading: Vector3d,
    /// The grid cells the vehicle is registered in.
    cells: CellList,
}

impl HostPosition {
    /// Registers a vehicle in the grid.
    pub(crate) fn place(
        grid: &mut Grid<EntityRef>,
        id: &str,
        record: EntityRef,
        position: Point3d,
        angle: f64,
        elevation: f64,
    ) -> Self {
        Self {
            position,
            heading: heading_vector(angle, elevation),
            cells: grid.insert(id, position, record),
        }
    }

    /// Moves a vehicle, updating the grid.
    pub(crate) fn relocate(
        &mut self,
        grid: &mut Grid<EntityRef>,
        id: &str,
        record: EntityRef,
        position: Point3d,
        angle: f64,
        elevation: f64,
    ) {
        self.cells = grid.relocate(id, &self.cells, position, record);
        self.position = position;
        self.heading = heading_vector(angle, elevation);
    }

    /// Removes a vehicle from the grid.
    pub(crate) fn erase(self, grid: &mut Grid<EntityRef>, id: &str) {
        grid.erase(id, &self.cells);
    }

    /// Gets the world coordinates of the vehicle.
    pub fn position(&self) -> Point3d {
        self.position
    }

    /// Gets the unit vector along the vehicle's heading.
    pub fn heading(&self) -> Vector3d {
        self.heading
    }

    /// Gets the grid cells the vehicle is registered in.
    pub fn cells(&self) -> &CellList {
        &self.cells
    }
}

/// A vehicle that is fully simulated by a host module.
#[derive(Clone, Debug)]
pub struct ManagedVehicle {
    /// The vehicle's ID.
    pub(crate) id: ManagedId,
    /// The server's identifier of the vehicle.
    external_id: String,
    /// The vehicle type reported by the server.
    class: String,
    /// The module simulating the vehicle.
    handle: ModuleHandle,
    pub(crate) host_pos: HostPosition,
    /// Whether the vehicle is parked.
    parked: bool,
}

impl ManagedVehicle {
    pub(crate) fn new(
        id: ManagedId,
        external_id: &str,
        class: &str,
        handle: ModuleHandle,
        host_pos: HostPosition,
    ) -> Self {
        Self {
            id,
            external_id: external_id.to_string(),
            class: class.to_string(),
            handle,
            host_pos,
            parked: false,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> ManagedId {
        self.id
    }

    /// Gets the server's identifier of the vehicle.
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Gets the vehicle type reported by the server.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Gets the module simulating the vehicle.
    pub fn module(&self) -> ModuleId {
        self.handle.module
    }

    /// Gets the handle of the module and its sub-modules.
    pub fn handle(&self) -> &ModuleHandle {
        &self.handle
    }

    pub fn host_pos(&self) -> &HostPosition {
        &self.host_pos
    }

    pub fn parked(&self) -> bool {
        self.parked
    }

    pub(crate) fn set_parked(&mut self, parked: bool) {
        self.parked = parked;
    }
}

/// A vehicle whose position is tracked but which has no module.
#[derive(Clone, Debug)]
pub struct UnequippedVehicle {
    pub(crate) id: UnequippedId,
    external_id: String,
    pub(crate) host_pos: HostPosition,
}

impl UnequippedVehicle {
    pub(crate) fn new(id: UnequippedId, external_id: &str, host_pos: HostPosition) -> Self {
        Self {
            id,
            external_id: external_id.to_string(),
            host_pos,
        }
    }

    pub fn id(&self) -> UnequippedId {
        self.id
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn host_pos(&self) -> &HostPosition {
        &self.host_pos
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::GridCoord;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::SlotMap;

    #[test]
    fn position_and_cells_move_together() {
        let mut ids = SlotMap::<UnequippedId, ()>::with_key();
        let record = EntityRef::Unequipped(ids.insert(()));
        let mut grid = Grid::new(1000.0, 1000.0, 100.0);

        let mut host_pos = HostPosition::place(&mut grid, "v", record, Point3d::new(50.0, 50.0, 0.0), 0.0, 0.0);
        assert_eq!(host_pos.cells().as_slice(), &[GridCoord::new(0, 0)]);
        assert_approx_eq!(host_pos.heading().x, 1.0);

        host_pos.relocate(&mut grid, "v", record, Point3d::new(350.0, 650.0, 2.0), 0.5 * std::f64::consts::PI, 0.0);
        assert_eq!(host_pos.position(), Point3d::new(350.0, 650.0, 2.0));
        assert_approx_eq!(host_pos.heading().y, -1.0);
        assert_eq!(host_pos.cells().as_slice(), &[GridCoord::new(3, 6)]);
        assert_eq!(grid.cells_of("v"), vec![GridCoord::new(3, 6)]);

        host_pos.erase(&mut grid, "v");
        assert!(grid.is_empty());
    }
}
