use clap::{Arg, Command};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use libprobecal::config::Settings;

fn make_template_settings(path: &Path) {
    let settings = Settings::default();
    let yaml_str = serde_yaml::to_string(&settings).unwrap();
    let mut file = File::create(path).expect("Could not create template settings file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn main() {
    // Create a cli
    let matches = Command::new("probecal_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template settings yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the settings file"),
        )
        .get_matches();

    // Initialize feedback
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logging!");

    // Parse the cli
    let settings_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making template settings at {}...",
            settings_path.to_string_lossy()
        );
        make_template_settings(&settings_path);
        log::info!("Done.");
        return;
    }

    // Load and validate the settings
    log::info!(
        "Loading settings from {}...",
        settings_path.to_string_lossy()
    );
    let settings = match Settings::read_settings_file(&settings_path) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if let Err(e) = settings.validate() {
        log::error!("{e}");
        return;
    }
    log::info!("Settings successfully loaded.");
    log::info!("Min Samples Per Bin: {}", settings.min_samples_per_bin);
    log::info!("Mux Modes Removed: {:?}", settings.mux_modes_removed);
    log::info!("Removal Margin (ns): {}", settings.removal_margin_ns);
    log::info!("Bin Length (ns): {}", settings.bin_length_ns);
    log::info!(
        "Bin Timestamp Offset (ns): {}",
        settings.bin_timestamp_offset_ns
    );
    log::info!("Baseline Quality Flag: {}", settings.baseline_quality_flag);
    log::info!(
        "Baseline Quality Bitmask: {:#06x}",
        settings.baseline_quality_bitmask
    );
}
