use std::env;
use std::fs;
use std::path::Path;

const PROVIDER_CFG_NAME: &str = "iprovider.toml";
const LOG_CFG_NAME: &str = "iprovider.log.toml";
const FIELD_DICTIONARY_NAME: &str = "RDMFieldDictionary";
const ENUM_DICTIONARY_NAME: &str = "enumtype.def";

fn main() {
    let source_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();

    let source_path = Path::new(&source_dir).join("config");

    // Navigate three levels up...
    let out_path = Path::new(&out_dir)
        .parent()
        .and_then(|pth| pth.parent())
        .and_then(|pth| pth.parent())
        .expect("Failed navigating to the target directory");

    for name in &[PROVIDER_CFG_NAME, LOG_CFG_NAME, FIELD_DICTIONARY_NAME, ENUM_DICTIONARY_NAME] {
        println!("cargo:rerun-if-changed=config/{}", name);

        fs::copy(source_path.join(name), out_path.join(name)).expect(&format!("Failed to copy {}", name));
    }
}
