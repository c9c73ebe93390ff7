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

use super::{no_connection, AuthResult, BoxStream, Dialer, Timeouts};
use crate::prelude::*;
use smol_str::SmolStr;
use std::{
	fmt::{self, Display, Write},
	io,
	time::Duration,
};

/// Number of log entries a fully populated record holds.
pub(crate) const LOG_FIELDS_CAPACITY: usize = 9;

/// Length of the backconnect trailer:
///```not_rust
/// +------------+---------+-----------+
/// | PACKAGE ID | USER ID | CLIENT IP |
/// +------------+---------+-----------+
/// |     4      |    4    |     4     |
/// +------------+---------+-----------+
///```
/// Both ids are big endian u32.
pub(crate) const BACKCONNECT_TRAILER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
	Ipv4,
	Ipv6,
	Hostname,
}

impl HostType {
	#[inline]
	#[must_use]
	pub fn of_ip(ip: &IpAddr) -> Self {
		match ip {
			IpAddr::V4(_) => Self::Ipv4,
			IpAddr::V6(_) => Self::Ipv6,
		}
	}
}

// ------------------------------------------------------------------
//                              Log fields
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogValue {
	Str(SmolStr),
	Int(i64),
	Bool(bool),
}

impl Display for LogValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LogValue::Str(s) => f.write_str(s),
			LogValue::Int(n) => n.fmt(f),
			LogValue::Bool(b) => b.fmt(f),
		}
	}
}

impl From<&str> for LogValue {
	#[inline]
	fn from(s: &str) -> Self {
		LogValue::Str(SmolStr::new(s))
	}
}

impl From<i64> for LogValue {
	#[inline]
	fn from(n: i64) -> Self {
		LogValue::Int(n)
	}
}

impl From<u16> for LogValue {
	#[inline]
	fn from(n: u16) -> Self {
		LogValue::Int(n.into())
	}
}

impl From<bool> for LogValue {
	#[inline]
	fn from(b: bool) -> Self {
		LogValue::Bool(b)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogField {
	pub key: &'static str,
	pub value: LogValue,
}

/// Displays log fields as space separated `key=value` pairs.
pub struct LogFields<'a>(pub &'a [LogField]);

impl Display for LogFields<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for field in self.0 {
			if !first {
				f.write_char(' ')?;
			}
			first = false;
			write!(f, "{}={}", field.key, field.value)?;
		}
		Ok(())
	}
}

// ------------------------------------------------------------------
//                                Fields
// ------------------------------------------------------------------

/// Per-connection request record shared by every protocol engine.
///
/// A record is owned by exactly one handshake at a time.
/// [`Fields::clean`] must run before it goes back to a pool.
pub struct Fields {
	pub conn: Option<BoxStream>,
	pub timeouts: Option<Arc<Timeouts>>,
	pub dialer_tcp: Option<Arc<dyn Dialer>>,
	pub dialer_udp: Option<Arc<dyn Dialer>>,

	/// Address the client connected from.
	pub user_ip: String,
	/// Address the client connected to.
	pub proxy_ip: String,
	/// `proxy_ip` packed as a big endian u32, 0 if it is not IPv4.
	pub proxy_ip_num: u32,

	pub login: String,
	pub password: String,
	pub package_id: i64,
	pub user_id: i64,
	pub backconnect: bool,
	pub system_user: bool,

	pub host_type: HostType,
	pub host: String,
	/// Only set when `host` is an IP literal.
	pub host_ip: Option<IpAddr>,
	pub port: String,
	pub port_num: u16,

	pub download: u64,
	pub upload: u64,

	pub log_fields: Vec<LogField>,
}

impl Default for Fields {
	fn default() -> Self {
		Self {
			conn: None,
			timeouts: None,
			dialer_tcp: None,
			dialer_udp: None,
			user_ip: String::new(),
			proxy_ip: String::new(),
			proxy_ip_num: 0,
			login: String::new(),
			password: String::new(),
			package_id: 0,
			user_id: 0,
			backconnect: false,
			system_user: false,
			host_type: HostType::Hostname,
			host: String::new(),
			host_ip: None,
			port: String::new(),
			port_num: 0,
			download: 0,
			upload: 0,
			log_fields: Vec::with_capacity(LOG_FIELDS_CAPACITY),
		}
	}
}

impl Fields {
	/// Drop every external reference and reset the record,
	/// keeping the capacity of strings and log fields.
	pub fn clean(&mut self) {
		self.conn = None;
		self.timeouts = None;
		self.dialer_tcp = None;
		self.dialer_udp = None;
		self.host_ip = None;
		self.log_fields.clear();

		self.user_ip.clear();
		self.proxy_ip.clear();
		self.proxy_ip_num = 0;
		self.login.clear();
		self.password.clear();
		self.package_id = 0;
		self.user_id = 0;
		self.backconnect = false;
		self.system_user = false;
		self.host_type = HostType::Hostname;
		self.host.clear();
		self.port.clear();
		self.port_num = 0;
		self.download = 0;
		self.upload = 0;
	}

	#[must_use]
	pub fn handshake_timeout(&self) -> Duration {
		self.timeouts
			.as_ref()
			.map_or_else(|| Timeouts::default().handshake, |t| t.handshake)
	}

	/// Longest time a relayed connection may stay idle.
	#[must_use]
	pub fn read_timeout(&self) -> Duration {
		self.timeouts
			.as_ref()
			.map_or_else(|| Timeouts::default().read, |t| t.read)
	}

	#[must_use]
	pub fn write_timeout(&self) -> Duration {
		self.timeouts
			.as_ref()
			.map_or_else(|| Timeouts::default().write, |t| t.write)
	}

	#[must_use]
	pub fn log_fields(&self) -> LogFields<'_> {
		LogFields(&self.log_fields)
	}

	pub fn push_log_field(&mut self, key: &'static str, value: impl Into<LogValue>) {
		self.log_fields.push(LogField {
			key,
			value: value.into(),
		});
	}

	/// Replace the value of the first entry named `key`, or append one.
	pub fn set_log_field(&mut self, key: &'static str, value: impl Into<LogValue>) {
		let value = value.into();
		if let Some(field) = self.log_fields.iter_mut().find(|f| f.key == key) {
			field.value = value;
		} else {
			self.log_fields.push(LogField { key, value });
		}
	}

	/// Append identity and target entries once a handshake succeeded.
	pub fn fill_log_fields(&mut self) {
		if self.system_user {
			self.push_log_field("system_user", true);
			self.push_log_field("package_type", "proxy");
		} else {
			self.push_log_field("package_id", self.package_id);
			self.push_log_field("user_id", self.user_id);
			let package_type = if self.backconnect {
				"backconnect"
			} else {
				"proxy"
			};
			self.push_log_field("package_type", package_type);
		}
		let host = LogValue::from(self.host.as_str());
		self.push_log_field("host", host);
		self.push_log_field("port", self.port_num);
	}

	pub(crate) fn take_conn(&mut self) -> io::Result<BoxStream> {
		self.conn.take().ok_or_else(no_connection)
	}

	pub(crate) fn set_credentials(&mut self, login: &str, password: &str) {
		set_string(&mut self.login, login);
		set_string(&mut self.password, password);
	}

	/// Identity from address-based auth, which never carries flags.
	pub(crate) fn set_ip_identity(&mut self, result: &AuthResult) {
		self.package_id = result.package_id;
		self.user_id = result.user_id;
		self.system_user = false;
		self.backconnect = false;
	}

	pub(crate) fn set_identity(&mut self, result: &AuthResult) {
		self.package_id = result.package_id;
		self.user_id = result.user_id;
		self.system_user = result.system_user;
		self.backconnect = result.backconnect;
	}

	/// Override identity and client address with a backconnect trailer.
	pub(crate) fn apply_backconnect(&mut self, trailer: &[u8; BACKCONNECT_TRAILER_LEN]) {
		let mut buf = &trailer[..];
		self.package_id = buf.get_u32().into();
		self.user_id = buf.get_u32().into();
		let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
		self.set_user_ip(&ip);
	}

	pub(crate) fn set_user_ip(&mut self, ip: &dyn Display) {
		set_string(&mut self.user_ip, ip);
		let user_ip = LogValue::from(self.user_ip.as_str());
		self.set_log_field("user_ip", user_ip);
	}

	pub(crate) fn set_port(&mut self, port: u16) {
		self.port_num = port;
		set_string(&mut self.port, port);
	}

	pub(crate) fn set_host_ip(&mut self, ip: IpAddr) {
		self.host_type = HostType::of_ip(&ip);
		self.host_ip = Some(ip);
		set_string(&mut self.host, ip);
	}

	pub(crate) fn set_host_name(&mut self, name: &str) {
		self.host_type = HostType::Hostname;
		self.host_ip = None;
		set_string(&mut self.host, name);
	}

	pub(crate) fn update_proxy_ip_num(&mut self) {
		self.proxy_ip_num = pack_ipv4(&self.proxy_ip);
	}
}

fn pack_ipv4(ip: &str) -> u32 {
	match IpAddr::from_str(ip) {
		Ok(IpAddr::V4(ip)) => u32::from(ip),
		Ok(IpAddr::V6(ip)) => ip.to_ipv4_mapped().map_or(0, u32::from),
		Err(_) => 0,
	}
}

/// Overwrite `dst` in place.
fn set_string(dst: &mut String, value: impl Display) {
	dst.clear();
	// Writing into a String never fails.
	let _ = write!(dst, "{}", value);
}
