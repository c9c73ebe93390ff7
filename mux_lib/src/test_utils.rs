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

use crate::{
	prelude::*,
	protocol::{AuthResult, Authorizer, Fields, Timeouts},
};
use std::time::Duration;
use tokio::io::DuplexStream;

pub const PROXY_IP: &str = "10.0.0.1";
pub const USER_IP: &str = "192.168.1.2";

pub fn init_log() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// Authorizer returning fixed results.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockAuthorizer {
	pub ip_auth_ret: AuthResult,
	pub credentials_auth_ret: AuthResult,
}

impl MockAuthorizer {
	pub fn ip_ok(package_id: i64, user_id: i64) -> Self {
		Self {
			ip_auth_ret: ok(package_id, user_id),
			credentials_auth_ret: AuthResult::DENIED,
		}
	}

	pub fn credentials_ok(result: AuthResult) -> Self {
		Self {
			ip_auth_ret: AuthResult::DENIED,
			credentials_auth_ret: result,
		}
	}
}

impl Authorizer for MockAuthorizer {
	fn ip_auth(&self, _proxy_ip: &str, _user_ip: &str) -> AuthResult {
		self.ip_auth_ret
	}

	fn credentials_auth(&self, _proxy_ip: &str, _login: &str, _password: &str) -> AuthResult {
		self.credentials_auth_ret
	}
}

pub fn ok(package_id: i64, user_id: i64) -> AuthResult {
	AuthResult {
		ok: true,
		package_id,
		user_id,
		..AuthResult::default()
	}
}

pub fn backconnect(package_id: i64, user_id: i64) -> AuthResult {
	AuthResult {
		backconnect: true,
		..ok(package_id, user_id)
	}
}

/// Create a record attached to one end of a pipe,
/// returning the other end as the client.
pub fn fields_with_pipe(handshake: Duration) -> (Fields, DuplexStream) {
	let (server, client) = tokio::io::duplex(4 * 1024);
	let mut fields = Fields::default();
	fields.conn = Some(Box::new(server));
	fields.timeouts = Some(Arc::new(Timeouts {
		handshake,
		..Timeouts::default()
	}));
	fields.user_ip.push_str(USER_IP);
	fields.proxy_ip.push_str(PROXY_IP);
	(fields, client)
}

pub fn fields_for_test() -> (Fields, DuplexStream) {
	fields_with_pipe(Duration::from_secs(5))
}
