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

mod inbound;

pub use inbound::Socks4Request;

use crate::protocol::ErrorKind;
use std::io;

pub const VER4: u8 = 4;

#[derive(Debug, thiserror::Error)]
pub enum Cause {
	#[error("unsupported command")]
	UnsupportedCommand(u8),
	#[error("ip and credentials auth failed")]
	BadCredentials,
	#[error("ip auth failed")]
	IpAuthFailed,
	#[error("{0}")]
	Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("SOCKS4 request error: {0}")]
	BadRequest(#[source] Cause),
	#[error("SOCKS4 authorization error: {0}")]
	Auth(#[source] Cause),
}

impl Error {
	#[must_use]
	pub fn cause(&self) -> &Cause {
		match self {
			Error::BadRequest(c) | Error::Auth(c) => c,
		}
	}

	#[must_use]
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Auth(_) => ErrorKind::Auth,
			Error::BadRequest(Cause::Io(e)) => ErrorKind::of_io(e),
			Error::BadRequest(_) => ErrorKind::BadRequest,
		}
	}
}

impl From<io::Error> for Error {
	#[inline]
	fn from(e: io::Error) -> Self {
		Error::BadRequest(Cause::Io(e))
	}
}
