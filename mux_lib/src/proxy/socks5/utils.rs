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

use crate::protocol::{socks_addr::ReadError, ErrorKind};
use num_enum::TryFromPrimitive;
use std::{fmt::Display, io};

pub const VER5: u8 = 5;
/// Subnegotiation version.
///
/// See more at <https://datatracker.ietf.org/doc/html/rfc1929#section-2>
pub const SUB_VERS: u8 = 1_u8;
pub(super) const AUTH_SUCCESSFUL: u8 = 0;
pub(super) const AUTH_FAILED: u8 = 1;
pub(super) const VAL_NO_AUTH: u8 = 0_u8;
pub(super) const VAL_USER_PASS: u8 = 2_u8;
pub(super) const VAL_NO_ACCEPTABLE: u8 = 0xff;

#[derive(Debug, TryFromPrimitive, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum CommandCode {
	Connect = 1,
	Bind = 2,
	Udp = 3,
}

impl Display for CommandCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CommandCode::Connect => write!(f, "CONNECT"),
			CommandCode::Bind => write!(f, "BIND"),
			CommandCode::Udp => write!(f, "UDP_ASSOCIATE"),
		}?;
		write!(f, "({})", *self as u8)
	}
}

#[derive(Debug, TryFromPrimitive, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
/// SOCKS5 reply code.
///
/// See more at <https://datatracker.ietf.org/doc/html/rfc1928#section-6>.
pub enum ReplyCode {
	Succeeded = 0,
	ServerFailure = 1,
	RuleFailure = 2,
	NetworkUnreachable = 3,
	HostUnreachable = 4,
	ConnectionRefused = 5,
	TtlExpired = 6,
	CommandNotSupported = 7,
	AddressTypeNotSupported = 8,
}

impl ReplyCode {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			ReplyCode::Succeeded => "succeeded",
			ReplyCode::ServerFailure => "general server failure",
			ReplyCode::RuleFailure => "not allowed by ruleset",
			ReplyCode::NetworkUnreachable => "network unreachable",
			ReplyCode::HostUnreachable => "host unreachable",
			ReplyCode::ConnectionRefused => "connection refused",
			ReplyCode::TtlExpired => "ttl expired",
			ReplyCode::CommandNotSupported => "command not supported",
			ReplyCode::AddressTypeNotSupported => "address type not supported",
		}
	}

	#[inline]
	#[must_use]
	pub const fn val(self) -> u8 {
		self as u8
	}
}

impl Display for ReplyCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Cause {
	#[error("no auth methods offered")]
	NoAuthMethods,
	#[error("user auth version mismatch")]
	UserAuthVersion(u8),
	#[error("bad credentials")]
	BadCredentials,
	#[error("no acceptable auth method")]
	NoAcceptableMethod,
	#[error("wrong socks version")]
	WrongVersion(u8),
	#[error("unknown command code received")]
	UnknownCommand(u8),
	#[error("unknown address type")]
	UnknownAddressType(u8),
	#[error("{0}")]
	Io(#[from] io::Error),
}

impl From<ReadError> for Cause {
	fn from(e: ReadError) -> Self {
		match e {
			ReadError::UnknownAddressType(atyp) => Cause::UnknownAddressType(atyp),
			ReadError::Io(e) => Cause::Io(e),
			other => Cause::Io(io::Error::new(io::ErrorKind::InvalidData, other)),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("SOCKS5 authorization error: {0}")]
	Auth(#[source] Cause),
	#[error("SOCKS5 command packet read error: {0}")]
	Command(#[source] Cause),
}

impl Error {
	#[must_use]
	pub fn cause(&self) -> &Cause {
		match self {
			Error::Auth(c) | Error::Command(c) => c,
		}
	}

	#[must_use]
	pub fn kind(&self) -> ErrorKind {
		match self.cause() {
			Cause::Io(e) => ErrorKind::of_io(e),
			Cause::BadCredentials | Cause::NoAcceptableMethod => ErrorKind::Auth,
			Cause::UnknownCommand(_) | Cause::UnknownAddressType(_) => ErrorKind::CommandFailure,
			Cause::NoAuthMethods | Cause::UserAuthVersion(_) | Cause::WrongVersion(_) => {
				ErrorKind::BadRequest
			}
		}
	}
}
