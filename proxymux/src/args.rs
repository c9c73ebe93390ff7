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

use super::{
	config::{Config, Format, LogOutput},
	BoxStdErr,
};
use clap::{CommandFactory, Parser};
use std::{
	net::SocketAddr,
	path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(name = "proxymux", about = "SOCKS4/SOCKS5/HTTP proxy front end on a single port")]
pub struct AppOptions {
	/// Config file to serve with.
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Config file format, 'toml' or 'json'.
	/// Guessed from the file extension if omitted.
	#[arg(short, long)]
	format: Option<Format>,

	/// Accept connections on ADDR instead of the addresses in the config file.
	/// May be repeated.
	#[arg(short, long = "listen", value_name = "ADDR")]
	listen: Vec<SocketAddr>,

	/// Override the handshake timeout (in seconds).
	#[arg(long, value_name = "SECS")]
	handshake_timeout: Option<u64>,

	/// Log level: trace, debug, info, warn, error or off.
	#[arg(long, value_name = "LEVEL")]
	log: Option<log::LevelFilter>,

	/// Log output: a file path, '@stdout', '@stderr' or '@none'.
	#[arg(long, value_name = "OUTPUT")]
	log_out: Option<String>,

	/// Print version and exit.
	#[arg(short = 'V', long)]
	version: bool,
}

impl AppOptions {
	pub fn new_from_args() -> Self {
		Self::parse()
	}

	pub fn into_action(self) -> Result<Action, BoxStdErr> {
		if self.version {
			return Ok(Action::CheckVersion);
		}
		let path = match self.config {
			Some(path) => path,
			None => {
				Self::command().print_help()?;
				std::process::exit(exitcode::USAGE);
			}
		};
		let format = self.format.unwrap_or_else(|| format_of(&path));
		let coms = ActionCommons {
			listen: self.listen,
			handshake_timeout: self.handshake_timeout,
			log: self.log,
			log_out: self.log_out.map(|s| LogOutput::from_str(&s)),
		};
		Ok(Action::Serve { coms, path, format })
	}
}

fn format_of(path: &Path) -> Format {
	match path.extension() {
		Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
		_ => Format::Toml,
	}
}

pub enum Action {
	CheckVersion,
	Serve {
		coms: ActionCommons,
		path: PathBuf,
		format: Format,
	},
}

/// Settings given on the command line that take precedence over the config file.
pub struct ActionCommons {
	pub listen: Vec<SocketAddr>,
	pub handshake_timeout: Option<u64>,
	pub log: Option<log::LevelFilter>,
	/// `Some(None)` disables logging.
	pub log_out: Option<Option<LogOutput>>,
}

impl ActionCommons {
	pub fn apply(self, conf: &mut Config) {
		if !self.listen.is_empty() {
			conf.listen = self.listen;
		}
		if let Some(secs) = self.handshake_timeout {
			conf.timeouts.handshake = secs;
		}
		if let Some(level) = self.log {
			conf.log.level = level;
		}
		if let Some(output) = self.log_out {
			conf.log.output = output;
		}
	}
}
