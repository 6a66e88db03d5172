//! Dump the Weather Relay OpenAPI document as pretty JSON.
//!
//!   cargo run --bin generate_openapi                      # to stdout
//!   cargo run --bin generate_openapi -- --output api.json # to a file

use std::{env, fs, io::Write, path::PathBuf};

use anyhow::{bail, Context, Result};
use utoipa::OpenApi;
use weather_relay::api::handlers::ApiDoc;

fn output_path() -> Result<Option<PathBuf>> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        None => Ok(None),
        Some("--output") => match args.next() {
            Some(path) => Ok(Some(PathBuf::from(path))),
            None => bail!("--output requires a path"),
        },
        Some(other) => bail!("unexpected argument {other:?}"),
    }
}

fn main() -> Result<()> {
    let document = ApiDoc::openapi()
        .to_pretty_json()
        .context("failed to serialise OpenAPI document")?;

    match output_path()? {
        Some(path) => {
            fs::write(&path, &document)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("OpenAPI document written to {}", path.display());
        }
        None => std::io::stdout()
            .write_all(document.as_bytes())
            .context("failed to write to stdout")?,
    }
    Ok(())
}
