use std::env;
use std::error::Error;
use std::process;

use getopts::Options;

use drawntorun::auth::hash_password;
use drawntorun::config::database_url;
use drawntorun::models::{NewUser, Role};
use drawntorun::store::{create_db_pool, PgStore, Store};

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn run(name: String, email: String, password: String, role: Role) -> Result<(), Box<dyn Error>> {
    let store = PgStore::new(create_db_pool(&database_url()?, 1)?);
    let user = store.create_user(NewUser {
        email: email.trim().to_lowercase(),
        name,
        role,
        password_hash: hash_password(&password)?,
    })?;
    println!("Created {} with ID {}", user.role, user.id);
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("n", "name", "user name", "NAME");
    opts.optopt("e", "email", "user email", "EMAIL");
    opts.optopt("p", "password", "initial password", "PASSWORD");
    opts.optopt("r", "role", "participant, organizer or admin", "ROLE");
    opts.optflag("h", "help", "print this help menu");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            process::exit(2);
        }
    };
    if matches.opt_present("h") {
        print_usage(&program, opts);
        return;
    }

    let (Some(name), Some(email), Some(password)) = (
        matches.opt_str("n"),
        matches.opt_str("e"),
        matches.opt_str("p"),
    ) else {
        print_usage(&program, opts);
        return;
    };
    if password.len() < 8 {
        eprintln!("password must be at least 8 characters");
        process::exit(2);
    }
    let role = match matches.opt_str("r").as_deref().map(str::parse::<Role>) {
        None => Role::Participant,
        Some(Ok(role)) => role,
        Some(Err(_)) => {
            print_usage(&program, opts);
            process::exit(2);
        }
    };

    if let Err(err) = run(name, email, password, role) {
        eprintln!("Failed to create user: {}", err);
        process::exit(1);
    }
}
