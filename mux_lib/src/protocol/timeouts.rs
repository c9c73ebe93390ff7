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

use std::time::Duration;

const DEFAULT_HANDSHAKE_SECS: u64 = 10;
const DEFAULT_CONNECT_SECS: u64 = 10;
const DEFAULT_READ_SECS: u64 = 60;
const DEFAULT_WRITE_SECS: u64 = 60;

/// Per-phase deadlines of a proxied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
	/// Bounds every read and write while a handshake is running.
	pub handshake: Duration,
	/// Bounds dialing the target host.
	pub connect: Duration,
	/// Longest idle period of a relayed connection, zero for no limit.
	pub read: Duration,
	/// Also bounds SOCKS5 replies sent after the handshake.
	pub write: Duration,
	/// Relay tuning value, passed through untouched.
	pub splice: u32,
}

impl Default for Timeouts {
	#[inline]
	fn default() -> Self {
		TimeoutsBuilder::default().build()
	}
}

// ------------------------------------------------------------------
//                               Builder
// ------------------------------------------------------------------

/// [`Timeouts`] as they appear in configuration, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
	feature = "use_serde",
	derive(serde::Deserialize),
	serde(deny_unknown_fields)
)]
pub struct TimeoutsBuilder {
	#[cfg_attr(feature = "use_serde", serde(default = "default_handshake"))]
	pub handshake: u64,
	#[cfg_attr(feature = "use_serde", serde(default = "default_connect"))]
	pub connect: u64,
	#[cfg_attr(feature = "use_serde", serde(default = "default_read"))]
	pub read: u64,
	#[cfg_attr(feature = "use_serde", serde(default = "default_write"))]
	pub write: u64,
	#[cfg_attr(feature = "use_serde", serde(default))]
	pub splice: u32,
}

impl TimeoutsBuilder {
	#[must_use]
	pub fn build(self) -> Timeouts {
		Timeouts {
			handshake: Duration::from_secs(self.handshake),
			connect: Duration::from_secs(self.connect),
			read: Duration::from_secs(self.read),
			write: Duration::from_secs(self.write),
			splice: self.splice,
		}
	}
}

impl Default for TimeoutsBuilder {
	fn default() -> Self {
		Self {
			handshake: default_handshake(),
			connect: default_connect(),
			read: default_read(),
			write: default_write(),
			splice: 0,
		}
	}
}

fn default_handshake() -> u64 {
	DEFAULT_HANDSHAKE_SECS
}

fn default_connect() -> u64 {
	DEFAULT_CONNECT_SECS
}

fn default_read() -> u64 {
	DEFAULT_READ_SECS
}

fn default_write() -> u64 {
	DEFAULT_WRITE_SECS
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_build() {
		let t = TimeoutsBuilder {
			handshake: 4,
			connect: 8,
			read: 15,
			write: 16,
			splice: 23,
		}
		.build();
		assert_eq!(t.handshake, Duration::from_secs(4));
		assert_eq!(t.connect, Duration::from_secs(8));
		assert_eq!(t.read, Duration::from_secs(15));
		assert_eq!(t.write, Duration::from_secs(16));
		assert_eq!(t.splice, 23);
	}
}
