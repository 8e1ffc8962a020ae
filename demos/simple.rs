extern crate chrones_core;
extern crate env_logger;

use std::env;

use chrones_core::RunnerConfig;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let program = args.next().unwrap_or_else(|| "true".to_string());
    let rest: Vec<String> = args.collect();

    let config = RunnerConfig::default();
    match chrones_core::run(&config, &program, &rest) {
        Ok(results) => println!("{}", serde_json::to_string_pretty(&results).unwrap()),
        Err(err) => eprintln!("run failed: {}", err),
    }
}
