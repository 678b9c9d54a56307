use std::process;

use drawntorun::config::database_url;
use drawntorun::{create_db, establish_connection};

fn main() {
    let url = match database_url() {
        Ok(url) => url,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    };
    let result = establish_connection(&url).and_then(|mut db| create_db(&mut db));
    match result {
        Ok(()) => println!("Database schema created"),
        Err(err) => {
            eprintln!("Failed to create DB: {}", err);
            process::exit(1);
        }
    }
}
