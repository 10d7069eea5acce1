//! Hardware seams: relay input lines and the temperature/humidity sensor.

pub mod sensor;
pub mod signal;

pub use sensor::{IioSensor, SensorReader, SensorSource};
pub use signal::{
    Debouncer, EdgeEvent, ManualSignals, SignalSource, SignalWatcher, SignalWatcherHandle,
    SysfsGpio, EVENT_BUFFER,
};
