use std::io::Write;

use maplit::hashmap;
use nichannel_backend::*;

const CFG_6259: &str = r#"
device = "Dev3"
ao_read_offset = 0.01

[analog_output.ao0]
channel = 0
sample_rate = 2000.0

[analog_output.ao1]
channel = 1
sample_rate = 2000.0
min_voltage = -5.0
max_voltage = 5.0

[analog_input.ai0]
channel = 0

[digital_input.ctr0]
input_channel = 0
counter_PFI_channel = 8
clock_PFI_channel = 13
clock_counter_channel = 1
sample_rate = 500.0

[digital_output.do0]
channel = 9
"#;

#[test]
/// Options left out of the file take the defaults used by existing experiment scripts.
fn toml_defaults() {
    let cfg = DeviceConfig::from_toml_str(CFG_6259).unwrap();
    assert_eq!(cfg.device, "Dev3");
    assert_eq!(cfg.override_buffer_size, -1);
    assert_eq!(cfg.ao_read_offset, 0.01);

    let ao0 = cfg.analog_output("ao0").unwrap();
    assert_eq!((ao0.min_voltage, ao0.max_voltage), (-10., 10.));
    let ao1 = cfg.analog_output("ao1").unwrap();
    assert_eq!((ao1.min_voltage, ao1.max_voltage), (-5., 5.));

    let ai0 = cfg.analog_input("ai0").unwrap();
    assert_eq!(ai0.sample_rate, 1000.);

    let ctr0 = cfg.digital_input("ctr0").unwrap();
    assert_eq!(ctr0.clock_pfi_channel, 13);
    assert_eq!(ctr0.sample_rate, 500.);

    let do0 = cfg.digital_output("do0").unwrap();
    assert_eq!((do0.channel, do0.sample_rate), (9, 1000.));
}

#[test]
fn toml_category_order_and_support() {
    let cfg = DeviceConfig::from_toml_str(CFG_6259).unwrap();
    assert_eq!(
        cfg.channel_names(Category::AnalogOutput).unwrap(),
        vec!["ao0", "ao1"]
    );

    // A device file without a section does not support that category
    let ao_only = DeviceConfig::from_toml_str("[analog_output.ao0]\nchannel = 0\n").unwrap();
    assert_eq!(ao_only.device, "Dev1");
    let expected_support = hashmap! {
        Category::AnalogOutput => true,
        Category::AnalogInput => false,
        Category::DigitalInput => false,
        Category::DigitalOutput => false,
    };
    for (category, supported) in expected_support {
        assert_eq!(ao_only.supports(category), supported, "{category}");
    }
}

#[test]
fn toml_inverted_range_rejected() {
    let src = "[analog_input.ai0]\nchannel = 0\nmin_voltage = 3.0\nmax_voltage = -3.0\n";
    assert!(matches!(
        DeviceConfig::from_toml_str(src),
        Err(ConfigError::Configuration(_))
    ));
}

#[test]
fn toml_malformed_rejected() {
    assert!(matches!(
        DeviceConfig::from_toml_str("[analog_output.ao0]\nsample_rate = \"fast\"\n"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CFG_6259.as_bytes()).unwrap();
    let cfg = DeviceConfig::load(file.path()).unwrap();
    cfg.validate(Category::DigitalInput, "ctr0").unwrap();

    assert!(matches!(
        DeviceConfig::load(file.path().with_extension("missing")),
        Err(ConfigError::Io(_))
    ));
}
