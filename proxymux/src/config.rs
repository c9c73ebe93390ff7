/**********************************************************************

Copyright (C) 2021 by reddal

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

**********************************************************************/

use crate::{auth::AuthConfig, BoxStdErr};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use mux_lib::TimeoutsBuilder;
use serde::Deserialize;
use std::{
	borrow::Cow,
	net::{IpAddr, SocketAddr},
	str::FromStr,
};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
	Toml,
	Json,
}

impl FromStr for Format {
	type Err = Cow<'static, str>;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut s = s.to_string();
		s.make_ascii_lowercase();
		Ok(match s.as_str() {
			"toml" => Self::Toml,
			"json" => Self::Json,
			_ => return Err("must be either 'toml' or 'json'".into()),
		})
	}
}

// ------------------- Logging -------------------
const STR_STDOUT: &str = "@stdout";
const STR_STDERR: &str = "@stderr";
const STR_NONE: &str = "@none";

const TIME_FORMAT: &[FormatItem<'static>] =
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

fn log_time(t: OffsetDateTime) -> String {
	t.format(TIME_FORMAT).unwrap_or_default()
}

#[derive(Debug, PartialEq, Eq)]
pub enum LogOutput {
	Stdout,
	Stderr,
	File(String),
}

impl LogOutput {
	pub fn is_colorful(&self) -> bool {
		matches!(self, Self::Stdout | Self::Stderr)
	}

	pub fn from_str(s: &str) -> Option<Self> {
		match s {
			STR_NONE => None,
			STR_STDOUT | "" => Some(LogOutput::Stdout),
			STR_STDERR => Some(LogOutput::Stderr),
			_ => Some(LogOutput::File(s.to_string())),
		}
	}
}

fn deserialize_output<'de, D>(deserializer: D) -> Result<Option<LogOutput>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s = <Cow<'de, str> as serde::Deserialize<'de>>::deserialize(deserializer)?;
	Ok(LogOutput::from_str(&s))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Log {
	#[serde(default = "default_log_level")]
	pub level: LevelFilter,
	#[serde(
		default = "default_output",
		deserialize_with = "deserialize_output",
		rename = "output"
	)]
	pub output: Option<LogOutput>,
}

impl Log {
	/// Initialize logger.
	///
	/// DO NOT call this function more than once!
	pub fn init_logger(&self) -> Result<(), BoxStdErr> {
		let output = if let Some(output) = &self.output {
			output
		} else {
			// Logging disabled
			return Ok(());
		};
		let is_colorful = output.is_colorful();
		let colors = ColoredLevelConfig::new()
			.info(Color::Blue)
			.trace(Color::Magenta);
		let dispatch = fern::Dispatch::new()
			.level(self.level)
			.format(move |out, message, record| {
				let time = log_time(OffsetDateTime::now_utc());
				let target = record.target();
				if is_colorful {
					let level = colors.color(record.level());
					out.finish(format_args!("[{} {} {}] {}", time, level, target, message));
				} else {
					let level = record.level();
					out.finish(format_args!("[{} {} {}] {}", time, level, target, message));
				}
			});
		match output {
			LogOutput::Stdout => dispatch.chain(std::io::stdout()),
			LogOutput::Stderr => dispatch.chain(std::io::stderr()),
			LogOutput::File(f) => dispatch.chain(fern::log_file(f)?),
		}
		.apply()?;
		Ok(())
	}
}

impl Default for Log {
	fn default() -> Self {
		Log {
			level: default_log_level(),
			output: default_output(),
		}
	}
}

fn default_log_level() -> LevelFilter {
	LevelFilter::Info
}

#[allow(clippy::unnecessary_wraps)]
fn default_output() -> Option<LogOutput> {
	Some(LogOutput::Stdout)
}

// ------------------- Config -------------------
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub log: Log,
	#[serde(default)]
	pub timeouts: TimeoutsBuilder,
	/// Addresses to accept connections on.
	pub listen: Vec<SocketAddr>,
	/// Proxy address handed to the authorizer.
	/// The local address of each connection is used if not set.
	#[serde(default)]
	pub proxy_ip: Option<IpAddr>,
	/// Maximum number of idle request records kept per protocol.
	#[serde(default = "default_max_idle")]
	pub max_idle: usize,
	#[serde(default)]
	pub auth: AuthConfig,
}

fn default_max_idle() -> usize {
	mux_lib::pool::DEFAULT_MAX_IDLE
}

#[cfg(all(test, feature = "parse-config"))]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn test_parse_toml() {
		let s = r#"
listen = ["127.0.0.1:1080", "[::1]:1080"]
proxy_ip = "1.2.3.4"

[log]
level = "debug"
output = "@none"

[timeouts]
handshake = 5

[[auth.ip]]
user_ip = "127.0.0.1"
package_id = 1
user_id = 11

[[auth.users]]
login = "a"
password = "b"
backconnect = true
"#;
		let conf: Config = toml::from_str(s).unwrap();
		assert_eq!(conf.listen.len(), 2);
		assert_eq!(conf.proxy_ip, Some(IpAddr::from([1, 2, 3, 4])));
		assert_eq!(conf.log.level, LevelFilter::Debug);
		assert_eq!(conf.log.output, None);
		let timeouts = conf.timeouts.build();
		assert_eq!(timeouts.handshake, Duration::from_secs(5));
		assert_eq!(timeouts.read, Duration::from_secs(60));
		assert_eq!(conf.max_idle, mux_lib::pool::DEFAULT_MAX_IDLE);
		assert_eq!(conf.auth.ip.len(), 1);
		assert!(conf.auth.users[0].backconnect);
	}

	#[test]
	fn test_parse_json() {
		let s = r#"{"listen": ["0.0.0.0:8080"], "log": {"output": "proxy.log"}}"#;
		let conf: Config = serde_json::from_str(s).unwrap();
		assert_eq!(conf.log.output, Some(LogOutput::File("proxy.log".into())));
		assert_eq!(conf.log.level, LevelFilter::Info);
		assert!(conf.proxy_ip.is_none());
	}

	#[test]
	fn test_log_time() {
		let t = time::macros::datetime!(2022-02-03 04:05:06 UTC);
		assert_eq!(log_time(t), "2022-02-03T04:05:06Z");
	}

	#[test]
	fn test_parse_timeouts_json() {
		let s = r#"{
			"listen": ["127.0.0.1:1080"],
			"timeouts": {"handshake": 4, "connect": 8, "read": 15, "write": 16, "splice": 23}
		}"#;
		let conf: Config = serde_json::from_str(s).unwrap();
		let t = conf.timeouts.build();
		assert_eq!(t.handshake, Duration::from_secs(4));
		assert_eq!(t.connect, Duration::from_secs(8));
		assert_eq!(t.read, Duration::from_secs(15));
		assert_eq!(t.write, Duration::from_secs(16));
		assert_eq!(t.splice, 23);
	}

	#[test]
	fn test_parse_timeouts_defaults() {
		let conf: Config = toml::from_str("listen = []
[timeouts]
handshake = 3
").unwrap();
		assert_eq!(
			conf.timeouts,
			TimeoutsBuilder {
				handshake: 3,
				..TimeoutsBuilder::default()
			}
		);
		let conf: Config = toml::from_str("listen = []
").unwrap();
		assert_eq!(conf.timeouts.build(), mux_lib::Timeouts::default());
		assert!(toml::from_str::<Config>("listen = []
[timeouts]
idle = 3
").is_err());
	}

	#[test]
	fn test_unknown_field() {
		assert!(toml::from_str::<Config>("listen = []\nfoo = 1").is_err());
	}
}
