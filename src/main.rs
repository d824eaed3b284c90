// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use mcsync::config::{DEFAULT_LISTEN, ServiceConfig};
use mcsync::trigger::TriggerBinding;

#[derive(Parser)]
#[command(
    name = "mcsync",
    about = "Keeps microcontroller component state in sync over MQTT",
    version
)]
struct Cli {
    /// HTTP listen address
    #[arg(long, env = "MCSYNC_LISTEN", default_value_t = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// MQTT broker host
    #[arg(long, env = "MCSYNC_MQTT_HOST", default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, env = "MCSYNC_MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    /// MQTT username
    #[arg(long, env = "MCSYNC_MQTT_USERNAME", requires = "mqtt_password")]
    mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, env = "MCSYNC_MQTT_PASSWORD", hide_env_values = true, requires = "mqtt_username")]
    mqtt_password: Option<String>,

    /// Seconds of state reports searched by recovery
    #[arg(long, env = "MCSYNC_RECOVERY_WINDOW_SECS", default_value_t = 30)]
    recovery_window_secs: u64,

    /// ARN prefix of scheduled rules
    #[arg(long, env = "MCSYNC_RULE_ARN_PREFIX", default_value = TriggerBinding::DEFAULT_RULE_ARN_PREFIX)]
    rule_arn_prefix: String,

    /// ARN the rules invoke
    #[arg(long, env = "MCSYNC_ADVANCER_ARN", default_value = TriggerBinding::DEFAULT_ADVANCER_ARN)]
    advancer_arn: String,
}

impl Cli {
    fn into_config(self) -> ServiceConfig {
        let builder = ServiceConfig::builder()
            .listen(self.listen)
            .mqtt_host(self.mqtt_host)
            .mqtt_port(self.mqtt_port)
            .recovery_window(Duration::from_secs(self.recovery_window_secs))
            .binding(TriggerBinding::new(self.rule_arn_prefix, self.advancer_arn));
        let builder = match (self.mqtt_username, self.mqtt_password) {
            (Some(username), Some(password)) => builder.mqtt_credentials(username, password),
            _ => builder,
        };
        builder.build()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    match mcsync::service::run(cli.into_config()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "mcsync stopped");
            ExitCode::FAILURE
        }
    }
}
