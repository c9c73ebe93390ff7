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

mod auth;
mod common;
pub(crate) mod fields;
pub mod socks_addr;
mod timeouts;

pub use auth::{AuthResult, Authorizer};
pub use common::{AsyncReadWrite, BoxStream, DialError, Dialer};
pub use fields::{Fields, HostType, LogField, LogFields, LogValue};
pub use socks_addr::{AddrType, Address};
pub use timeouts::{Timeouts, TimeoutsBuilder};

use crate::utils::deadline::is_timeout;
use std::io;

/// Category of a failed handshake, shared by all protocol engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Malformed, truncated or unparseable framing.
	BadRequest,
	/// Both address-based and credential-based authorization failed,
	/// or the credentials were malformed.
	Auth,
	/// Unsupported SOCKS5 command or address type.
	CommandFailure,
	/// A deadline elapsed with zero bytes transferred.
	Timeout,
}

impl ErrorKind {
	#[inline]
	#[must_use]
	pub(crate) fn of_io(e: &io::Error) -> Self {
		if is_timeout(e) {
			Self::Timeout
		} else {
			Self::BadRequest
		}
	}
}

#[inline]
pub(crate) fn no_connection() -> io::Error {
	io::Error::new(
		io::ErrorKind::NotConnected,
		"no connection attached to request",
	)
}
