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

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::default_trait_access)]

mod args;
mod auth;
mod config;
mod handler;
mod parse_config_impl;
mod relay;
mod serve;

use args::{Action, AppOptions};
use config::Config;
use std::{borrow::Cow, fs::File, io::Read};
use tokio::runtime::Runtime;

type BoxStdErr = Box<dyn std::error::Error + Send + Sync>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("[IO error] {0}")]
	Io(#[from] std::io::Error),
	#[error("[input] {0}")]
	Input(Cow<'static, str>),
	#[error("[config] {0}")]
	Config(BoxStdErr),
	#[error("[runtime] {0}")]
	Runtime(BoxStdErr),
}

impl Error {
	#[inline]
	pub fn input(s: impl Into<Cow<'static, str>>) -> Self {
		Self::Input(s.into())
	}
}

fn read_conf_str(path: &std::path::Path) -> Result<String, std::io::Error> {
	let mut conf_str = String::with_capacity(1024);
	File::open(path)?.read_to_string(&mut conf_str)?;
	Ok(conf_str)
}

fn serve(action: Action) -> Result<(), Error> {
	let conf = match action {
		Action::CheckVersion => {
			println!("{}", VERSION);
			return Ok(());
		}
		Action::Serve { coms, path, format } => {
			let conf_str = read_conf_str(&path).map_err(|e| {
				Error::input(format!("cannot read config '{}': {}", path.display(), e))
			})?;
			parse_config_impl::make_config(format, &conf_str, coms)?
		}
	};
	conf.log.init_logger().map_err(Error::Config)?;

	let rt = Runtime::new()?;
	rt.block_on(serve::serve(conf)).map_err(Error::Runtime)
}

fn main() {
	let action = match AppOptions::new_from_args().into_action() {
		Ok(action) => action,
		Err(err) => {
			println!("Invalid arguments: {}", err);
			std::process::exit(exitcode::USAGE);
		}
	};
	if let Err(err) = serve(action) {
		println!("Error happened during initialization:\n {}\n", err);
		std::process::exit(match err {
			Error::Io(_) => exitcode::IOERR,
			Error::Input(_) | Error::Config(_) => exitcode::CONFIG,
			Error::Runtime(_) => exitcode::SOFTWARE,
		});
	}
}
