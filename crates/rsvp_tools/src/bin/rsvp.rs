#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};

use rsvp_tools::admin_cli::{execute_admin_command, UreqTransport, DEFAULT_API_URL, USAGE};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let subcommand = args.first().ok_or_else(|| USAGE.to_string())?;
    let base_url = env::var("RSVP_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let token = read_admin_token()?;

    let transport = UreqTransport::new(&base_url, token);
    let output = execute_admin_command(&transport, subcommand, &args[1..])?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn read_admin_token() -> Result<String, String> {
    if let Ok(token) = env::var("RSVP_ADMIN_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token);
        }
    }
    let token = if io::stdin().is_terminal() {
        rpassword::prompt_password("Admin token:").map_err(|e| e.to_string())?
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        input
    };
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err("admin token must not be empty".to_string());
    }
    Ok(token)
}
