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

use super::{Cause, Error};
use crate::{
	pool::Recycle,
	prelude::*,
	protocol::{fields::BACKCONNECT_TRAILER_LEN, no_connection, Authorizer, Fields, LogValue},
	utils::DeadlineStream,
};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

const CMD_CONNECT: u8 = 1;
const REPLY_VERSION: u8 = 0;
const REPLY_GRANTED: u8 = 0x5a;
const REPLY_REJECTED: u8 = 0x5b;

/// Upper bound of bytes read after the fixed part of the request:
/// 512 bytes for identd and hostname, minus the 8 bytes already read,
/// plus the backconnect trailer.
const REQUEST_SIZE_LIMIT: u64 = 516;
const READER_CAPACITY: usize = 128;

/// SOCKS4/SOCKS4a handshake engine and the record it fills.
///
/// The dispatcher has already consumed the version byte.
pub struct Socks4Request {
	pub fields: Fields,
	/// identd followed by hostname (SOCKS4a only), NULs stripped.
	buf: Vec<u8>,
}

impl Recycle for Socks4Request {
	fn new_pooled() -> Self {
		Self {
			fields: Fields::default(),
			buf: Vec::with_capacity(READER_CAPACITY),
		}
	}

	fn recycle(&mut self) {
		self.fields.clean();
		self.buf.clear();
	}
}

impl Socks4Request {
	/// Read the rest of the request in the following format:
	///```not_rust
	/// +----+----+----------+--------+----------+------+------------+------+
	/// | VN | CD | DST.PORT | DST.IP |  USERID  | NULL |   DOMAIN   | NULL |
	/// +----+----+----------+--------+----------+------+------------+------+
	/// | 1  | 1  |    2     |   4    | variable |  1   |  variable  |  1   |
	/// +----+----+----------+--------+----------+------+------------+------+
	///```
	/// `DOMAIN` is only present if `DST.IP` is `0.0.0.x` with `x` non zero.
	///
	/// # Errors
	///
	/// Returns [`Error::BadRequest`] if the request is malformed or cannot be read,
	/// or [`Error::Auth`] if authorization failed.
	pub async fn read<A: Authorizer + ?Sized>(&mut self, auth: &A) -> Result<(), Error> {
		let fields = &mut self.fields;
		let user_ip = LogValue::from(fields.user_ip.as_str());
		let proxy_ip = LogValue::from(fields.proxy_ip.as_str());
		fields.push_log_field("user_ip", user_ip);
		fields.push_log_field("proxy_ip", proxy_ip);

		let conn = fields.take_conn()?;
		let mut stream = DeadlineStream::new(conn, fields.handshake_timeout());
		let res = self.handshake(&mut stream, auth).await;

		let fields = &mut self.fields;
		// Plus the version byte.
		fields.upload = stream.read_count() + 1;
		fields.conn = Some(stream.into_inner());
		res?;

		fields.fill_log_fields();
		fields.update_proxy_ip_num();
		trace!("SOCKS4 handshake done, {}", fields.log_fields());
		Ok(())
	}

	async fn handshake<S, A>(&mut self, stream: &mut S, auth: &A) -> Result<(), Error>
	where
		S: AsyncRead + Unpin,
		A: Authorizer + ?Sized,
	{
		let Self { fields, buf } = self;

		let mut header = [0_u8; 7];
		stream.read_exact(&mut header).await?;
		let cmd = header[0];
		if cmd != CMD_CONNECT {
			return Err(Error::BadRequest(Cause::UnsupportedCommand(cmd)));
		}
		fields.set_port(u16::from_be_bytes([header[1], header[2]]));
		let ip = [header[3], header[4], header[5], header[6]];
		let socks4a = ip[..3] == [0, 0, 0] && ip[3] != 0;
		if socks4a {
			fields.push_log_field("type", "SOCKS4a");
		} else {
			fields.set_host_ip(Ipv4Addr::from(ip).into());
			fields.push_log_field("type", "SOCKS4");
		}

		let mut reader =
			BufReader::with_capacity(READER_CAPACITY, stream.take(REQUEST_SIZE_LIMIT));
		buf.clear();
		read_cstr(&mut reader, buf).await?;
		let ident_len = buf.len();
		if socks4a {
			read_cstr(&mut reader, buf).await?;
		}
		let (ident, host) = buf.split_at(ident_len);
		if socks4a {
			fields.set_host_name(&String::from_utf8_lossy(host));
		}

		fields.login.clear();
		fields.password.clear();
		let result = auth.ip_auth(&fields.proxy_ip, &fields.user_ip);
		if result.ok {
			fields.set_ip_identity(&result);
		} else if ident.is_empty() {
			return Err(Error::Auth(Cause::IpAuthFailed));
		} else {
			let ident = String::from_utf8_lossy(ident);
			let (login, password) = ident.split_once('.').unwrap_or((&*ident, ""));
			fields.set_credentials(login, password);
			let result = auth.credentials_auth(&fields.proxy_ip, login, password);
			if !result.ok {
				return Err(Error::Auth(Cause::BadCredentials));
			}
			fields.set_identity(&result);
			if fields.backconnect {
				let mut trailer = [0_u8; BACKCONNECT_TRAILER_LEN];
				reader.read_exact(&mut trailer).await?;
				fields.apply_backconnect(&trailer);
			}
		}
		Ok(())
	}

	/// Reply to the request, granted or rejected.
	///
	/// Uses the write timeout and returns the number of bytes written.
	///
	/// # Errors
	///
	/// Returns an error if there is no connection attached or writing failed.
	pub async fn send_reply(&mut self, granted: bool) -> io::Result<usize> {
		let status = if granted {
			REPLY_GRANTED
		} else {
			REPLY_REJECTED
		};
		let port = self.fields.port_num.to_be_bytes();
		let ip = match self.fields.host_ip {
			Some(IpAddr::V4(ip)) => ip.octets(),
			_ => [0; 4],
		};
		let buf = [
			REPLY_VERSION,
			status,
			port[0],
			port[1],
			ip[0],
			ip[1],
			ip[2],
			ip[3],
		];
		let timeout = self.fields.write_timeout();
		let conn = self.fields.conn.as_mut().ok_or_else(no_connection)?;
		let mut stream = DeadlineStream::new(conn, timeout);
		stream.write_all(&buf).await?;
		stream.flush().await?;
		Ok(buf.len())
	}
}

/// Append a NUL terminated string to `buf`, without the NUL.
async fn read_cstr<R>(r: &mut R, buf: &mut Vec<u8>) -> io::Result<()>
where
	R: AsyncBufRead + Unpin,
{
	r.read_until(0, buf).await?;
	if buf.pop() == Some(0) {
		Ok(())
	} else {
		// Either EOF or the size limit was reached.
		Err(io::ErrorKind::UnexpectedEof.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		protocol::{AuthResult, ErrorKind, HostType},
		test_utils::{backconnect, fields_with_pipe, init_log, ok, MockAuthorizer},
	};
	use std::time::Duration;

	struct GoodCase {
		request: Vec<u8>,
		auth: MockAuthorizer,
		host: &'static str,
		port: &'static str,
		package_id: i64,
		user_id: i64,
		system_user: bool,
		backconnect: bool,
	}

	#[test]
	fn test_good_requests() {
		init_log();
		let cases = vec![
			// ip auth, SOCKS4
			GoodCase {
				request: vec![1, 0, 22, 212, 15, 134, 65, 0],
				auth: MockAuthorizer::ip_ok(1, 11),
				host: "212.15.134.65",
				port: "22",
				package_id: 1,
				user_id: 11,
				system_user: false,
				backconnect: false,
			},
			// identd auth, SOCKS4
			GoodCase {
				request: b"\x01\x00\x50\x4b\x0f\x0d\x41test.test\x00".to_vec(),
				auth: MockAuthorizer::credentials_ok(ok(2, 22)),
				host: "75.15.13.65",
				port: "80",
				package_id: 2,
				user_id: 22,
				system_user: false,
				backconnect: false,
			},
			// ip auth, SOCKS4a
			GoodCase {
				request: b"\x01\x15\x38\x00\x00\x00\x0d\x00ya.ru\x00".to_vec(),
				auth: MockAuthorizer::ip_ok(3, 33),
				host: "ya.ru",
				port: "5432",
				package_id: 3,
				user_id: 33,
				system_user: false,
				backconnect: false,
			},
			// identd auth, SOCKS4a
			GoodCase {
				request: b"\x01\x00\x50\x00\x00\x00\x41test.test\x00yy.ru\x00".to_vec(),
				auth: MockAuthorizer::credentials_ok(ok(4, 44)),
				host: "yy.ru",
				port: "80",
				package_id: 4,
				user_id: 44,
				system_user: false,
				backconnect: false,
			},
			// backconnect, SOCKS4a
			GoodCase {
				request: b"\x01\x00\x63\x00\x00\x00\x21a.b\x00ex.ru\x00\
					\x00\x00\x00\x05\x00\x00\x00\x37\x05\x05\x05\x05"
					.to_vec(),
				auth: MockAuthorizer::credentials_ok(backconnect(0, 0)),
				host: "ex.ru",
				port: "99",
				package_id: 5,
				user_id: 55,
				system_user: false,
				backconnect: true,
			},
			// system user, SOCKS4a
			GoodCase {
				request: b"\x01\x00\x63\x00\x00\x00\x21a.b\x00ex.ru\x00".to_vec(),
				auth: MockAuthorizer::credentials_ok(AuthResult {
					system_user: true,
					..ok(0, 0)
				}),
				host: "ex.ru",
				port: "99",
				package_id: 0,
				user_id: 0,
				system_user: true,
				backconnect: false,
			},
		];
		let rt = tokio::runtime::Runtime::new().unwrap();
		for (nr, case) in cases.into_iter().enumerate() {
			rt.block_on(async {
				let (fields, mut client) = fields_with_pipe(Duration::from_secs(5));
				let mut req = Socks4Request::new_pooled();
				req.fields = fields;
				client.write_all(&case.request).await.unwrap();
				if let Err(e) = req.read(&case.auth).await {
					panic!("case #{}: cannot read request {:?}", nr + 1, e);
				}
				let f = &req.fields;
				assert_eq!(f.host, case.host, "case #{}", nr + 1);
				assert_eq!(f.port, case.port, "case #{}", nr + 1);
				assert_eq!(f.package_id, case.package_id, "case #{}", nr + 1);
				assert_eq!(f.user_id, case.user_id, "case #{}", nr + 1);
				assert_eq!(f.system_user, case.system_user, "case #{}", nr + 1);
				assert_eq!(f.backconnect, case.backconnect, "case #{}", nr + 1);
				if f.backconnect {
					assert_eq!(f.user_ip, "5.5.5.5", "case #{}", nr + 1);
					assert_eq!(f.log_fields[0].value, LogValue::from("5.5.5.5"));
				}
				assert_eq!(f.upload, case.request.len() as u64 + 1, "case #{}", nr + 1);
			});
		}
	}

	#[test]
	fn test_host_types() {
		let task = async move {
			let (fields, mut client) = fields_with_pipe(Duration::from_secs(5));
			let mut req = Socks4Request::new_pooled();
			req.fields = fields;
			client
				.write_all(b"\x01\x00\x50\x00\x00\x00\x01\x00example.org\x00")
				.await
				.unwrap();
			req.read(&MockAuthorizer::ip_ok(1, 1)).await.unwrap();
			assert_eq!(req.fields.host_type, HostType::Hostname);
			assert!(req.fields.host_ip.is_none());
			assert_eq!(req.fields.log_fields[2].value, LogValue::from("SOCKS4a"));
			assert!(req.fields.conn.is_some());

			// Granted reply echoes the port.
			let n = req.send_reply(true).await.unwrap();
			let mut reply = [0_u8; 8];
			client.read_exact(&mut reply).await.unwrap();
			assert_eq!(n, 8);
			assert_eq!(reply, [0, 0x5a, 0, 80, 0, 0, 0, 0]);

			let (fields, mut client) = fields_with_pipe(Duration::from_secs(5));
			let mut req = Socks4Request::new_pooled();
			req.fields = fields;
			client.write_all(&[1, 0, 80, 0, 0, 0, 0, 0]).await.unwrap();
			req.read(&MockAuthorizer::ip_ok(1, 1)).await.unwrap();
			assert_eq!(req.fields.host_type, HostType::Ipv4);
			assert_eq!(req.fields.host, "0.0.0.0");
			assert_eq!(req.fields.log_fields[2].value, LogValue::from("SOCKS4"));

			req.send_reply(false).await.unwrap();
			client.read_exact(&mut reply).await.unwrap();
			assert_eq!(reply, [0, 0x5b, 0, 80, 0, 0, 0, 0]);
		};
		tokio::runtime::Runtime::new().unwrap().block_on(task);
	}

	#[test]
	fn test_bad_requests() {
		init_log();
		let long_ident = {
			let mut v = vec![1, 0, 22, 1, 2, 3, 4];
			v.resize(v.len() + 540, b'a');
			v
		};
		let cases: Vec<(Vec<u8>, ErrorKind, &str)> = vec![
			(
				vec![1, 0, 0],
				ErrorKind::Timeout,
				"SOCKS4 request error: deadline exceeded",
			),
			(
				vec![2, 0, 22, 1, 2, 3, 4, 0],
				ErrorKind::BadRequest,
				"SOCKS4 request error: unsupported command",
			),
			(
				long_ident,
				ErrorKind::BadRequest,
				"SOCKS4 request error: unexpected end of file",
			),
			(
				b"\x01\x00\x16\x01\x01\x01\x01a.\x00".to_vec(),
				ErrorKind::Auth,
				"SOCKS4 authorization error: ip and credentials auth failed",
			),
			(
				b"\x01\x00\x16\x01\x01\x01\x01aa\x00".to_vec(),
				ErrorKind::Auth,
				"SOCKS4 authorization error: ip and credentials auth failed",
			),
			(
				vec![1, 0, 22, 1, 1, 1, 1, 0],
				ErrorKind::Auth,
				"SOCKS4 authorization error: ip auth failed",
			),
			(
				b"\x01\x00\x16\x00\x00\x00\x01\x00abc".to_vec(),
				ErrorKind::Timeout,
				"SOCKS4 request error: deadline exceeded",
			),
		];
		let rt = tokio::runtime::Runtime::new().unwrap();
		for (nr, (request, kind, msg)) in cases.into_iter().enumerate() {
			rt.block_on(async {
				let (fields, mut client) = fields_with_pipe(Duration::from_millis(100));
				let mut req = Socks4Request::new_pooled();
				req.fields = fields;
				client.write_all(&request).await.unwrap();
				let e = req
					.read(&MockAuthorizer::default())
					.await
					.expect_err("request should fail");
				assert_eq!(e.kind(), kind, "case #{}: {}", nr + 1, e);
				assert_eq!(e.to_string(), msg, "case #{}", nr + 1);
				assert!(req.fields.conn.is_some());
			});
		}
	}

	#[test]
	fn test_identd_split() {
		let task = async move {
			let (fields, mut client) = fields_with_pipe(Duration::from_secs(5));
			let mut req = Socks4Request::new_pooled();
			req.fields = fields;
			client
				.write_all(b"\x01\x00\x50\x01\x02\x03\x04user.pa.ss\x00")
				.await
				.unwrap();
			req.read(&MockAuthorizer::credentials_ok(ok(1, 1)))
				.await
				.unwrap();
			assert_eq!(req.fields.login, "user");
			assert_eq!(req.fields.password, "pa.ss");

			let (fields, mut client) = fields_with_pipe(Duration::from_secs(5));
			let mut req = Socks4Request::new_pooled();
			req.fields = fields;
			client
				.write_all(b"\x01\x00\x50\x01\x02\x03\x04user\x00")
				.await
				.unwrap();
			req.read(&MockAuthorizer::credentials_ok(ok(1, 1)))
				.await
				.unwrap();
			assert_eq!(req.fields.login, "user");
			assert_eq!(req.fields.password, "");
		};
		tokio::runtime::Runtime::new().unwrap().block_on(task);
	}
}
