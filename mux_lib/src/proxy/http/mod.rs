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
mod response;
mod utils;

pub use inbound::{HttpRequest, RequestHead};
pub use response::ErrorResponse;

use crate::protocol::ErrorKind;
use std::{io, num::ParseIntError};

pub const PROTOCOL_NAME: &str = "HTTP";

#[derive(Debug, thiserror::Error)]
pub enum Cause {
	/// The request head cannot be read or parsed.
	#[error("failed to read http request")]
	RequestReadFailed(#[source] Option<io::Error>),
	#[error("request head too large")]
	HeadTooLarge,
	#[error("not authoritative request")]
	NotAuthoritative,
	#[error("unknown scheme")]
	UnknownScheme,
	#[error("bad port")]
	BadPort,
	#[error("{0}")]
	InvalidAddress(&'static str),
	#[error("invalid port ({0})")]
	InvalidPort(#[from] ParseIntError),
	#[error("not basic auth")]
	NotBasicAuth,
	#[error("invalid base64 ({0})")]
	InvalidBase64(#[from] base64::DecodeError),
	#[error("bad credentials")]
	BadCredentials,
	#[error("invalid {0} header ({1})")]
	InvalidIdHeader(&'static str, #[source] ParseIntError),
	#[error("no user ip provided in a backconnect request")]
	NoBackconnectUserIp,
	#[error("ip auth failed, no credentials provided")]
	IpAuthFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("HTTP bad request: {0}")]
	BadRequest(#[source] Cause),
	#[error("HTTP authorization error: {0}")]
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
			Error::BadRequest(Cause::RequestReadFailed(Some(e))) => ErrorKind::of_io(e),
			Error::BadRequest(_) => ErrorKind::BadRequest,
		}
	}
}

impl From<Cause> for Error {
	#[inline]
	fn from(c: Cause) -> Self {
		Error::BadRequest(c)
	}
}

impl From<io::Error> for Error {
	#[inline]
	fn from(e: io::Error) -> Self {
		Error::BadRequest(Cause::RequestReadFailed(Some(e)))
	}
}
