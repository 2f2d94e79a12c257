// SPDX-License-Identifier: Apache-2.0

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use std::path::Path;

use crate::init::BoxError;
use crate::init::args::TailArgs;
use crate::tail::TailConfig;

const ENV_PREFIX: &str = "ROTEL_TAIL_";

/// Layered configuration sources, lowest priority first: built-in defaults,
/// the JSON file, then `ROTEL_TAIL_*` environment variables. Nested keys use
/// a double underscore, as in `ROTEL_TAIL_RATE_LIMIT__BURST`.
pub fn figment(config_file: Option<&Path>) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(TailConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Json::file(path));
    }
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Build the session configuration, with command line options applied last.
pub fn load_config(args: &TailArgs) -> Result<TailConfig, BoxError> {
    if let Some(path) = &args.config {
        if !path.exists() {
            return Err(format!("config file {:?} does not exist", path).into());
        }
    }

    let mut config: TailConfig = match figment(args.config.as_deref()).extract() {
        Ok(config) => config,
        Err(e) => return Err(format!("failed to parse tail config: {}", e).into()),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}
