use pulsar::config::ProviderConfig;
use serdeconv;

fn main() {
    let config = serdeconv::to_toml_string(&ProviderConfig::default()).expect("Failed to generate config file");

    println!("{}", config);
}
