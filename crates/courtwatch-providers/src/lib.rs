pub mod docketalarm;
pub mod lexmachina;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use courtwatch_core::{config::Config, provider::ProviderClient};

use crate::{docketalarm::DocketAlarmClient, lexmachina::LexMachinaClient};

/// Build the provider named by `PROVIDER`. Credentials are required up front
/// so a misconfigured server fails at startup rather than on first refresh.
pub fn from_config(config: &Config) -> Result<Arc<dyn ProviderClient>> {
    match config.provider.as_str() {
        "lexmachina" | "lex_machina" => {
            if config.lex_machina_client_id.is_empty() || config.lex_machina_client_secret.is_empty()
            {
                bail!("LEX_MACHINA_CLIENT_ID and LEX_MACHINA_CLIENT_SECRET must be set");
            }
            Ok(Arc::new(
                LexMachinaClient::new(
                    &config.lex_machina_client_id,
                    &config.lex_machina_client_secret,
                )
                .with_base_url(&config.lex_machina_base_url),
            ))
        }
        "docketalarm" | "docket_alarm" => {
            if config.docket_alarm_username.is_empty() || config.docket_alarm_password.is_empty() {
                bail!("DOCKET_ALARM_USERNAME and DOCKET_ALARM_PASSWORD must be set");
            }
            Ok(Arc::new(
                DocketAlarmClient::new(
                    &config.docket_alarm_username,
                    &config.docket_alarm_password,
                )
                .with_base_url(&config.docket_alarm_base_url)
                .with_client_matter(&config.docket_alarm_client_matter)
                .with_session_ttl(Duration::from_secs(config.docket_alarm_session_ttl_s)),
            ))
        }
        other => bail!("unknown PROVIDER {other:?} (expected lexmachina or docketalarm)"),
    }
}
