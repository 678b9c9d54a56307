use std::process;

use drawntorun::config::database_url;
use drawntorun::{empty_db, establish_connection};

fn main() {
    let result = database_url()
        .map_err(|err| err.to_string())
        .and_then(|url| establish_connection(&url).map_err(|err| err.to_string()))
        .and_then(|mut db| empty_db(&mut db).map_err(|err| err.to_string()));
    if let Err(err) = result {
        eprintln!("Failed to empty DB: {}", err);
        process::exit(1);
    }
}
