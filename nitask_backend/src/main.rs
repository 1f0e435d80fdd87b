use std::env;

use nichannel_backend::DeviceConfig;
use nitask_backend::*;

// Acquires 100 samples on ai0, then reads back every analog output.
// Usage: nitask_backend_bin [device.toml]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cfg = match env::args().nth(1) {
        Some(path) => DeviceConfig::load(path)?,
        None => DeviceConfig::default(),
    };
    if !NiDaqmx::probe() {
        log::warn!("NI-DAQmx not found at {}", default_library_path());
    }
    let daq = Daq::new(cfg, NiDaqmx::connect()?)?;
    if !daq.is_connected() {
        return Err(format!("Device {} is not reachable", daq.config().device).into());
    }
    log::info!("Connected to {} ({})", daq.config().device, daq.product_type()?);

    let id = daq.ai_init("ai0", 100)?;
    daq.run(&id)?;
    let samples = daq.read_analog(&id)?;
    daq.stop(&id)?;
    let mean = samples.iter().sum::<f64>() / samples.len().max(1) as f64;
    println!("{id}: {} samples, mean {mean:.4} V", samples.len());

    let ao_names = daq.config().channel_names(nichannel_backend::Category::AnalogOutput)?;
    for (name, volts) in daq.get_analog_voltages(&ao_names)? {
        println!("{name}: {volts:.4} V");
    }
    daq.shutdown()?;
    Ok(())
}
