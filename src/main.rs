use log::{error, info};
use std::collections::HashMap;
use traci_bridge::math::{Point2d, Point3d};
use traci_bridge::{
    HostRuntime, ManagerConfig, MobilityState, ModuleHandle, ModuleId, ModuleSpec, ScenarioManager, SimTime,
    TrafficLightChange,
};

/// The edge length of the square playground, in m.
const PLAYGROUND_SIZE: f64 = 10_000.0;

/// A host which builds no real modules and logs what it is asked to do.
#[derive(Default)]
struct LoggingHost {
    next_id: u64,
    /// Module names by identifier.
    modules: HashMap<ModuleId, String>,
}

impl LoggingHost {
    fn allocate(&mut self) -> ModuleId {
        self.next_id += 1;
        ModuleId(self.next_id)
    }

    fn name(&self, module: ModuleId) -> &str {
        self.modules.get(&module).map_or("?", String::as_str)
    }
}

impl HostRuntime for LoggingHost {
    fn playground(&self) -> Point2d {
        Point2d::new(PLAYGROUND_SIZE, PLAYGROUND_SIZE)
    }

    fn module_type_exists(&self, _type_name: &str) -> bool {
        true
    }

    fn create_module(&mut self, spec: &ModuleSpec) -> ModuleHandle {
        let module = self.allocate();
        let name = format!("{}[{}]", spec.name, spec.index);
        info!("creating {} of type {}", name, spec.type_name);
        self.modules.insert(module, name);
        ModuleHandle {
            module,
            mobility: Some(self.allocate()),
            nic: Some(self.allocate()),
            tl_interface: Some(self.allocate()),
        }
    }

    fn set_display_string(&mut self, _module: ModuleId, _display_string: &str) {}

    fn build_inside(&mut self, _module: ModuleId) {}

    fn schedule_start(&mut self, module: ModuleId, at: SimTime) {
        info!("{} starts at t={}", self.name(module), at);
    }

    fn call_initialize(&mut self, _module: ModuleId) {}

    fn call_finish(&mut self, _module: ModuleId) {}

    fn delete_module(&mut self, module: ModuleId) {
        if let Some(name) = self.modules.remove(&module) {
            info!("deleted {}", name);
        }
    }

    fn pre_initialize_mobility(&mut self, _mobility: ModuleId, vehicle_id: &str, state: &MobilityState) {
        info!(
            "vehicle {} enters at ({:.1}, {:.1}) on {}",
            vehicle_id, state.position.x, state.position.y, state.road_id
        );
    }

    fn change_position(&mut self, _mobility: ModuleId) {}

    fn next_position(&mut self, _mobility: ModuleId, _state: &MobilityState) {}

    fn change_parking_state(&mut self, _mobility: ModuleId, parked: bool) {
        info!("vehicle parked: {}", parked);
    }

    fn place_mobility(&mut self, _mobility: ModuleId, _position: Point3d) {}

    fn pre_initialize_traffic_light(
        &mut self,
        _tl_interface: ModuleId,
        tl_id: &str,
        position: Point3d,
        _update_interval: SimTime,
    ) {
        info!("traffic light {} at ({:.1}, {:.1})", tl_id, position.x, position.y);
    }

    fn update_traffic_light(&mut self, _tl_interface: ModuleId, change: &TrafficLightChange) {
        info!("traffic light changed: {:?}", change);
    }

    fn record_scalar(&mut self, name: &str, value: f64) {
        info!("{} = {}", name, value);
    }
}

fn main() {
    env_logger::init();

    let args = std::env::args().collect::<Vec<_>>();
    if let Err(err) = run(&args) {
        error!("{}", err);
        std::process::exit(1);
    }
}

/// Usage: `traci-bridge [config.json] [max steps]`
fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = match args.get(1) {
        Some(path) => ManagerConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ManagerConfig::default(),
    };
    let max_steps = args.get(2).map(|s| s.parse::<usize>()).transpose()?;

    let mut manager: ScenarioManager<_> = ScenarioManager::new(&config, LoggingHost::default())?;
    manager.connect()?;

    let mut next = Some(manager.first_step_at());
    let mut steps = 0;
    while let Some(now) = next {
        if max_steps.map_or(false, |max| steps >= max) {
            break;
        }
        next = manager.step(now)?;
        steps += 1;
    }

    let counts = manager.counts();
    info!(
        "stopped after {} steps: {} active, {} driving, {} parking, {} managed",
        steps,
        counts.active,
        counts.driving,
        counts.parking,
        manager.registry().managed_count()
    );
    manager.finish();
    Ok(())
}
