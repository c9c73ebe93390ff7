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

use mux_lib::{AuthResult, Authorizer};
use serde::Deserialize;
use std::{collections::HashMap, net::IpAddr, str::FromStr};

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
	/// Clients allowed by address.
	#[serde(default)]
	pub ip: Vec<IpEntry>,
	/// Clients allowed by login and password.
	#[serde(default)]
	pub users: Vec<UserEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpEntry {
	pub user_ip: IpAddr,
	/// Only match connections made to this proxy address.
	#[serde(default)]
	pub proxy_ip: Option<IpAddr>,
	pub package_id: i64,
	pub user_id: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserEntry {
	pub login: String,
	pub password: String,
	#[serde(default)]
	pub package_id: i64,
	#[serde(default)]
	pub user_id: i64,
	#[serde(default)]
	pub system_user: bool,
	#[serde(default)]
	pub backconnect: bool,
}

struct IpRule {
	proxy_ip: Option<IpAddr>,
	result: AuthResult,
}

struct UserRule {
	password: String,
	result: AuthResult,
}

/// [`Authorizer`] backed by fixed lists from the config file.
pub struct StaticAuthorizer {
	ips: HashMap<IpAddr, Vec<IpRule>>,
	users: HashMap<String, UserRule>,
}

impl StaticAuthorizer {
	pub fn new(conf: &AuthConfig) -> Self {
		let mut ips: HashMap<IpAddr, Vec<IpRule>> = HashMap::new();
		for entry in &conf.ip {
			ips.entry(entry.user_ip).or_default().push(IpRule {
				proxy_ip: entry.proxy_ip,
				result: AuthResult {
					ok: true,
					package_id: entry.package_id,
					user_id: entry.user_id,
					..AuthResult::default()
				},
			});
		}
		let users = conf
			.users
			.iter()
			.map(|entry| {
				let rule = UserRule {
					password: entry.password.clone(),
					result: AuthResult {
						ok: true,
						package_id: entry.package_id,
						user_id: entry.user_id,
						system_user: entry.system_user,
						backconnect: entry.backconnect,
					},
				};
				(entry.login.clone(), rule)
			})
			.collect();
		Self { ips, users }
	}
}

impl Authorizer for StaticAuthorizer {
	fn ip_auth(&self, proxy_ip: &str, user_ip: &str) -> AuthResult {
		let user_ip = match IpAddr::from_str(user_ip) {
			Ok(ip) => ip,
			Err(_) => return AuthResult::DENIED,
		};
		let proxy_ip = IpAddr::from_str(proxy_ip).ok();
		self.ips
			.get(&user_ip)
			.and_then(|rules| {
				rules
					.iter()
					.find(|r| r.proxy_ip.is_none() || r.proxy_ip == proxy_ip)
			})
			.map_or(AuthResult::DENIED, |r| r.result)
	}

	fn credentials_auth(&self, _proxy_ip: &str, login: &str, password: &str) -> AuthResult {
		match self.users.get(login) {
			Some(rule) if rule.password == password => rule.result,
			_ => AuthResult::DENIED,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn authorizer() -> StaticAuthorizer {
		StaticAuthorizer::new(&AuthConfig {
			ip: vec![
				IpEntry {
					user_ip: IpAddr::from([127, 0, 0, 1]),
					proxy_ip: None,
					package_id: 1,
					user_id: 11,
				},
				IpEntry {
					user_ip: IpAddr::from([10, 0, 0, 2]),
					proxy_ip: Some(IpAddr::from([10, 0, 0, 1])),
					package_id: 2,
					user_id: 22,
				},
			],
			users: vec![UserEntry {
				login: "a".into(),
				password: "b".into(),
				package_id: 3,
				user_id: 33,
				system_user: false,
				backconnect: true,
			}],
		})
	}

	#[test]
	fn test_ip_auth() {
		let auth = authorizer();
		let res = auth.ip_auth("1.1.1.1", "127.0.0.1");
		assert!(res.ok);
		assert_eq!((res.package_id, res.user_id), (1, 11));
		assert!(!res.backconnect);

		assert!(auth.ip_auth("10.0.0.1", "10.0.0.2").ok);
		assert!(!auth.ip_auth("10.0.0.9", "10.0.0.2").ok);
		assert!(!auth.ip_auth("10.0.0.1", "10.0.0.3").ok);
		assert!(!auth.ip_auth("10.0.0.1", "pipe").ok);
	}

	#[test]
	fn test_credentials_auth() {
		let auth = authorizer();
		let res = auth.credentials_auth("1.1.1.1", "a", "b");
		assert!(res.ok);
		assert!(res.backconnect);
		assert_eq!(res.package_id, 3);
		assert_eq!(auth.credentials_auth("1.1.1.1", "a", "c"), AuthResult::DENIED);
		assert_eq!(auth.credentials_auth("1.1.1.1", "", ""), AuthResult::DENIED);
	}
}
