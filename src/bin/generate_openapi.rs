//! Dumps the compiled OpenAPI spec for the greenhouse control API.
//!
//! Writes to stdout by default; pass a path to write a file instead:
//!   cargo run --bin generate_openapi > openapi.json
//!   cargo run --bin generate_openapi -- openapi.json

use std::{env, fs, io, io::Write, process};

use greenhouse_service::api::handlers::ApiDoc;
use utoipa::OpenApi;

fn main() {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .expect("Failed to serialise OpenAPI spec");

    match env::args().nth(1) {
        Some(path) => {
            if let Err(e) = fs::write(&path, &json) {
                eprintln!("Error writing to {path}: {e}");
                process::exit(1);
            }
            eprintln!("OpenAPI spec written to {path}");
        }
        None => {
            io::stdout()
                .write_all(json.as_bytes())
                .expect("Failed to write to stdout");
        }
    }
}
