use clap::{Arg, Command};

use prechat_relay::{apis::Api, config};

fn main() {
    let matches = Command::new("Config Check")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Confirm that the secrets interpolated relay config is what you expect it to be")
        .arg(
            Arg::new("config")
                .help("Path to the configuration toml file")
                .long("config")
                .default_value("./prechat-relay/resources/relay.toml"),
        )
        .arg(
            Arg::new("secrets")
                .help("Path to the secrets json file")
                .long("secrets")
                .default_value("./prechat-relay/private-resources/secrets.json"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let secrets_path = matches.get_one::<String>("secrets").unwrap();

    let configuration = match config::read_and_interpolate(config_path, secrets_path, true) {
        Ok(configuration) => configuration,
        Err(e) => {
            eprintln!("Configuration invalid: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Api::new(configuration.apis) {
        eprintln!("API configuration invalid: {e}");
        std::process::exit(1);
    }

    println!("Configuration OK");
}
