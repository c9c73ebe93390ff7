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

/// Outcome of an authorization query.
///
/// Only produced by an [`Authorizer`], handshake engines never build one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthResult {
	pub ok: bool,
	pub package_id: i64,
	pub user_id: i64,
	/// Internal user without package or user id.
	pub system_user: bool,
	/// The identity may override package id, user id and client address.
	pub backconnect: bool,
}

impl AuthResult {
	/// A result with `ok` set to false.
	pub const DENIED: AuthResult = AuthResult {
		ok: false,
		package_id: 0,
		user_id: 0,
		system_user: false,
		backconnect: false,
	};
}

/// Authorization decisions consulted during a handshake.
///
/// Implementations must be safe to call from many handshakes at once.
pub trait Authorizer: Send + Sync {
	/// Authorize by the address the client connected to (`proxy_ip`)
	/// and the address it connected from (`user_ip`).
	fn ip_auth(&self, proxy_ip: &str, user_ip: &str) -> AuthResult;

	/// Authorize by login and password received on `proxy_ip`.
	fn credentials_auth(&self, proxy_ip: &str, login: &str, password: &str) -> AuthResult;
}

impl<A: Authorizer + ?Sized> Authorizer for std::sync::Arc<A> {
	#[inline]
	fn ip_auth(&self, proxy_ip: &str, user_ip: &str) -> AuthResult {
		(**self).ip_auth(proxy_ip, user_ip)
	}

	#[inline]
	fn credentials_auth(&self, proxy_ip: &str, login: &str, password: &str) -> AuthResult {
		(**self).credentials_auth(proxy_ip, login, password)
	}
}
