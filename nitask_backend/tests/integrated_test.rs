use indexmap::IndexMap;
use maplit::hashmap;
use ndarray::{array, Array1, Array2};

use nichannel_backend::*;
use nitask_backend::*;

fn sim_daq() -> Daq<SimDaqmx> {
    Daq::new(DeviceConfig::ni6259(), SimDaqmx::new()).unwrap()
}

#[test]
/// `ai0` at 1kHz: init, run, read the 100 samples, stop. The identifier is gone afterwards.
fn ai_end_to_end() {
    let daq = sim_daq();
    daq.driver().set_analog_value(0.25);

    let id = daq.ai_init("ai0", 100).unwrap();
    assert_eq!(id.as_str(), "ai000");
    let rec = daq.task(&id).unwrap();
    assert_eq!(rec.state, TaskState::Configured);
    assert_eq!(rec.physical_chans, "Dev1/ai0");

    daq.run(&id).unwrap();
    assert_eq!(daq.task(&id).unwrap().state, TaskState::Running);
    let samples = daq.read_analog(&id).unwrap();
    assert_eq!(samples.len(), 100);
    assert!(samples.iter().all(|&v| v == 0.25));

    daq.stop(&id).unwrap();
    assert!(matches!(daq.stop(&id), Err(DaqError::UnknownTask(_))));
    assert!(matches!(daq.task(&id), Err(DaqError::UnknownTask(_))));
    assert!(matches!(daq.run(&id), Err(DaqError::UnknownTask(_))));
    assert!(daq.driver().live_handles().is_empty());
}

#[test]
/// The sample count is the waveform length, whether it is given as one row or as a row per channel.
fn ao_sample_count_from_waveform() {
    let daq = sim_daq();
    let single = daq
        .ao_init(&["ao0"], Array1::linspace(0., 1., 7), None)
        .unwrap();
    assert_eq!(daq.task(&single).unwrap().samples, 7);

    let multi = daq
        .ao_init(&["ao1", "ao2", "ao3"], Array2::<f64>::zeros((3, 12)), None)
        .unwrap();
    let rec = daq.task(&multi).unwrap();
    assert_eq!((rec.samples, rec.num_channels), (12, 3));
    assert_eq!(rec.timeout, analog_timeout(12, 1000.));
    daq.shutdown().unwrap();
    assert!(daq.live_tasks().is_empty());
}

#[test]
fn set_analog_voltages_two_samples() {
    let daq = sim_daq();
    for v in [-9.5, 0., 3.3] {
        let mut voltages = IndexMap::new();
        voltages.insert(String::from("ao0"), v);
        daq.set_analog_voltages(&voltages).unwrap();
        let (_, task) = daq.driver().tasks().pop().unwrap();
        assert_eq!(task.analog_written, vec![v, v]);
        assert!(task.cleared);
    }
    // Each call used a fresh task
    assert_eq!(daq.driver().call_count("DAQmxCreateTask"), 3);
}

#[test]
/// Identifiers keep counting up across stops and never come back.
fn ids_are_monotonic() {
    let daq = sim_daq();
    let mut ids = Vec::new();
    for i in 0..5 {
        let id = daq.ai_init("ai1", 10).unwrap();
        if i % 2 == 0 {
            daq.stop(&id).unwrap();
        }
        ids.push(id.to_string());
    }
    assert_eq!(ids, vec!["ai000", "ai001", "ai002", "ai003", "ai004"]);
    assert_eq!(
        daq.live_tasks()
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>(),
        vec!["ai001", "ai003"]
    );
    // Other kinds count independently
    assert_eq!(daq.do_init(&["do0"]).unwrap().as_str(), "do000");
    assert_eq!(
        daq.gated_counter_init("ctr0", 5).unwrap().as_str(),
        "gatedctr000"
    );
}

#[test]
fn gated_counter_prevents_duplicate_counts() {
    for pfi in [0, 8, 15] {
        let mut cfg = DeviceConfig::ni6259();
        cfg.digital_input = Some(
            [(
                String::from("ctr0"),
                CounterChannel::new(0, pfi, 13, 1, 1000.).unwrap(),
            )]
            .into_iter()
            .collect(),
        );
        let daq = Daq::new(cfg, SimDaqmx::new()).unwrap();
        let id = daq.gated_counter_init("ctr0", 20).unwrap();
        let task = daq.driver().task(daq.task(&id).unwrap().primary).unwrap();
        assert_eq!(task.dup_count_prevent, Some(true));
        assert_eq!(
            task.timebase_src.as_deref(),
            Some(format!("/Dev1/PFI{pfi}").as_str())
        );
    }
}

#[test]
fn counter_timeout_formula() {
    for (samples, rate) in [(1, 1.), (1000, 1000.), (250, 100.), (7, 3000.)] {
        let mut cfg = DeviceConfig::ni6259();
        if let Some(ctrs) = cfg.digital_input.as_mut() {
            ctrs[0].sample_rate = rate;
        }
        let daq = Daq::new(cfg, SimDaqmx::new()).unwrap();
        let id = daq.counter_init("ctr0", samples, false).unwrap();
        let rec = daq.task(&id).unwrap();
        assert_eq!(rec.timeout, 5. * samples as f64 / rate);
        assert_eq!(rec.timeout, counter_timeout(samples, rate));
        assert!(rec.secondary.is_some());
    }
}

#[test]
/// Read-back voltages are the raw driver value plus `ao_read_offset`.
fn get_analog_voltages_adds_offset() {
    let mut cfg = DeviceConfig::ni6259();
    cfg.ao_read_offset = 0.01;
    let daq = Daq::new(cfg, SimDaqmx::new()).unwrap();
    for raw in [-10., -0.5, 0., 4.2] {
        daq.driver().set_analog_value(raw);
        let res = daq.get_analog_voltages(&["ao0", "ai3"]).unwrap();
        assert_eq!(res["ao0"], raw + 0.01);
        assert_eq!(res["ai3"], raw + 0.01);
    }
}

#[test]
/// Unknown channels are configuration errors raised before the driver is touched.
fn unknown_channels_rejected_before_driver() {
    let daq = sim_daq();
    let invalid = |res: Result<TaskId, DaqError>| {
        matches!(
            res,
            Err(DaqError::Config(ConfigError::InvalidChannel { .. }))
        )
    };
    assert!(invalid(daq.ai_init("ai9", 10)));
    assert!(invalid(daq.ao_init(&["ao0", "ao7"], Array2::<f64>::zeros((2, 2)), None)));
    assert!(invalid(daq.do_init(&["do1"])));
    assert!(invalid(daq.counter_init("ctr5", 10, false)));
    assert!(invalid(daq.gated_counter_init("ctr5", 10)));
    assert!(matches!(
        daq.get_analog_voltages(&["ai9"]),
        Err(DaqError::Config(ConfigError::InvalidChannel { .. }))
    ));

    let ao_only = Daq::new(DeviceConfig::ni9263(), SimDaqmx::new()).unwrap();
    assert!(matches!(
        ao_only.ai_init("ai0", 10),
        Err(DaqError::Config(ConfigError::UnsupportedCategory { .. }))
    ));

    assert!(daq.driver().calls().is_empty());
    assert!(ao_only.driver().calls().is_empty());
}

#[test]
fn mismatched_sample_rates_rejected_before_driver() {
    let mut cfg = DeviceConfig::ni6259();
    if let Some(ao) = cfg.analog_output.as_mut() {
        ao.insert(
            String::from("ao1"),
            AnalogChannel::new(1, 500., -10., 10.).unwrap(),
        );
    }
    let daq = Daq::new(cfg, SimDaqmx::new()).unwrap();
    match daq.ao_init(&["ao0", "ao1"], array![[0., 1.], [1., 0.]], None) {
        Err(DaqError::MismatchedSampleRate { rates, .. }) => assert_eq!(rates, vec![1000., 500.]),
        other => panic!("Expected MismatchedSampleRate, got {other:?}"),
    }
    assert!(daq.driver().calls().is_empty());
}

#[test]
fn mismatched_digital_rates_rejected_before_driver() {
    let mut cfg = DeviceConfig::ni6259();
    if let Some(dout) = cfg.digital_output.as_mut() {
        dout.insert(String::from("do1"), DigitalOutChannel::new(9, 500.).unwrap());
    }
    let daq = Daq::new(cfg, SimDaqmx::new()).unwrap();
    match daq.do_init(&["do0", "do1"]) {
        Err(DaqError::MismatchedSampleRate { channels, rates }) => {
            assert_eq!(channels, vec!["do0", "do1"]);
            assert_eq!(rates, vec![1000., 500.]);
        }
        other => panic!("Expected MismatchedSampleRate, got {other:?}"),
    }
    assert!(daq.driver().calls().is_empty());
}

#[test]
/// Reading an analog input on a device without analog inputs names the missing category.
fn get_analog_voltages_unsupported_category() {
    let daq = Daq::new(DeviceConfig::ni9263(), SimDaqmx::new()).unwrap();
    assert!(matches!(
        daq.get_analog_voltages(&["ai0"]),
        Err(DaqError::Config(ConfigError::UnsupportedCategory {
            category: Category::AnalogInput,
            ..
        }))
    ));
    assert!(matches!(
        daq.get_analog_voltages(&["ao7"]),
        Err(DaqError::Config(ConfigError::InvalidChannel { .. }))
    ));
    assert!(daq.driver().calls().is_empty());
}

#[test]
/// A driver failure halfway through an init clears every handle created so far and registers nothing.
fn failed_init_rolls_back() {
    let daq = sim_daq();
    let failures = hashmap! {
        "DAQmxCfgSampClkTiming" => -200077,
        "DAQmxWriteAnalogF64" => -200018,
        "DAQmxStartTask" => -200479,
        "DAQmxSetCIDupCountPrevent" => -200452,
        "DAQmxCreateDOChan" => -200170,
    };
    for (func, code) in failures {
        daq.driver().clear_failures();
        daq.driver().fail_on(func, code);
        let res = match func {
            "DAQmxWriteAnalogF64" => daq.ao_init(&["ao0"], vec![1., 2.], None),
            // Starting the clock generator is the last step of a counter init
            "DAQmxStartTask" => daq.counter_init("ctr0", 10, false),
            // Duplicate-count prevention is the last step of a gated counter init
            "DAQmxSetCIDupCountPrevent" => daq.gated_counter_init("ctr0", 10),
            "DAQmxCreateDOChan" => daq.do_init(&["do0"]),
            _ => daq.ai_init("ai0", 10),
        };
        match res {
            Err(DaqError::Driver(err)) => assert_eq!(err.code, code),
            other => panic!("{func}: expected a driver error, got {other:?}"),
        }
        assert!(daq.live_tasks().is_empty(), "{func}");
        assert!(daq.driver().live_handles().is_empty(), "{func}");
    }
    // Failed inits do not burn identifiers
    daq.driver().clear_failures();
    assert_eq!(daq.ai_init("ai0", 10).unwrap().as_str(), "ai000");
    assert_eq!(daq.do_init(&["do0"]).unwrap().as_str(), "do000");
    assert_eq!(
        daq.gated_counter_init("ctr0", 10).unwrap().as_str(),
        "gatedctr000"
    );
}

#[test]
/// Dropping the device stops and clears whatever the caller left running.
fn dropping_daq_clears_live_tasks() {
    let sim = SimDaqmx::new();
    {
        let daq = Daq::new(DeviceConfig::ni6259(), sim.clone()).unwrap();
        daq.ai_init("ai0", 10).unwrap();
        let ctr = daq.counter_init("ctr0", 10, true).unwrap();
        daq.run(&ctr).unwrap();
        assert_eq!(sim.live_handles().len(), 3);
    }
    assert!(sim.live_handles().is_empty());
    assert!(sim.tasks().iter().all(|(_, t)| t.cleared && !t.started));
}

#[test]
fn counter_shares_its_clock() {
    let daq = sim_daq();
    let ctr = daq.counter_init("ctr0", 100, true).unwrap();
    let clock = daq.sample_clock_terminal(&ctr).unwrap().unwrap();
    let ao = daq
        .ao_init(&["ao0"], vec![0.; 100], Some(clock.as_str()))
        .unwrap();
    assert_eq!(daq.sample_clock_terminal(&ao).unwrap(), None);

    let ao_task = daq.driver().task(daq.task(&ao).unwrap().primary).unwrap();
    assert!(matches!(
        ao_task.timing,
        Some(SimTiming::SampleClock { source, .. }) if source == "/Dev1/PFI13"
    ));
}
