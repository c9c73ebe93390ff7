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

use super::{
	utils::{
		append_headers, decode_basic_auth, get_version, parse_port, put_http_headers,
		remove_prefixed, split_host_port, version_to_bytes, MAX_HEADERS_NUM,
	},
	Cause, Error, ErrorResponse, PROTOCOL_NAME,
};
use crate::{
	pool::Recycle,
	prelude::*,
	protocol::{no_connection, Authorizer, Fields, LogValue},
	utils::{read_until, DeadlineStream, PrefixedStream, ReadUntilError},
};
use http::{
	header::{HOST, PROXY_AUTHORIZATION, USER_AGENT},
	HeaderMap, HeaderValue, Method, Uri, Version,
};
use std::io;
use tokio::io::BufReader;

/// Largest accepted request head, including the terminating blank line.
const MAX_HEADER_SIZE: usize = 16 * 1024;
const READ_BUFFER_SIZE: usize = 4 * 1024;

const X_PACKAGE_ID: &str = "x-packageid";
const X_USER_ID: &str = "x-userid";
const X_CLIENT_IP: &str = "x-clientip";

/// Parsed head of a plain (non-CONNECT) request.
#[derive(Debug)]
pub struct RequestHead {
	pub method: Method,
	pub uri: Uri,
	pub version: Version,
	pub headers: HeaderMap,
}

impl RequestHead {
	/// Write the head in origin form, ready to be sent to the target.
	///
	/// A `Host` header is derived from the request target if the
	/// client did not send one.
	pub fn write_to<B: BufMut>(&self, buf: &mut B) {
		// Request line
		buf.put_slice(self.method.as_str().as_bytes());
		buf.put_u8(b' ');
		buf.put_slice(self.uri.path().as_bytes());
		if let Some(query) = self.uri.query() {
			buf.put_u8(b'?');
			buf.put_slice(query.as_bytes());
		}
		buf.put_u8(b' ');
		buf.put_slice(version_to_bytes(self.version));
		buf.put_slice(CRLF);

		if !self.headers.contains_key(HOST) {
			let host = target_host_port(&self.uri);
			if !host.is_empty() {
				buf.put_slice(b"host: ");
				buf.put_slice(host.as_bytes());
				buf.put_slice(CRLF);
			}
		}
		put_http_headers(buf, &self.headers);
		buf.put_slice(CRLF);
	}
}

/// HTTP proxy handshake engine and the record it fills.
pub struct HttpRequest {
	pub fields: Fields,
	/// Byte already consumed by the dispatcher.
	pub first_byte: u8,
	/// Set for `CONNECT` requests.
	pub tunnel: bool,
	/// Head to forward, only kept when `tunnel` is false.
	pub request: Option<RequestHead>,
	/// Bytes received after the request head.
	pub buffered: Vec<u8>,
	head_buf: Vec<u8>,
}

impl Recycle for HttpRequest {
	fn new_pooled() -> Self {
		Self {
			fields: Fields::default(),
			first_byte: 0,
			tunnel: false,
			request: None,
			buffered: Vec::new(),
			head_buf: Vec::new(),
		}
	}

	fn recycle(&mut self) {
		self.fields.clean();
		self.first_byte = 0;
		self.tunnel = false;
		self.request = None;
		self.buffered.clear();
	}
}

impl HttpRequest {
	/// Read the request head (with `first_byte` in front of it),
	/// resolve the target and authorize the client.
	///
	/// Nothing is written to the client.
	/// On error the caller may answer with an [`super::ErrorResponse`].
	///
	/// # Errors
	///
	/// Returns [`Error::Auth`] if authorization failed,
	/// or [`Error::BadRequest`] for anything else.
	pub async fn read<A: Authorizer + ?Sized>(&mut self, auth: &A) -> Result<(), Error> {
		let fields = &mut self.fields;
		let user_ip = LogValue::from(fields.user_ip.as_str());
		let proxy_ip = LogValue::from(fields.proxy_ip.as_str());
		fields.push_log_field("user_ip", user_ip);
		fields.push_log_field("proxy_ip", proxy_ip);
		fields.push_log_field("type", PROTOCOL_NAME);
		self.tunnel = false;
		self.request = None;
		self.buffered.clear();

		let conn = fields.take_conn()?;
		let mut stream = DeadlineStream::new(conn, fields.handshake_timeout());
		let res = read_head(
			&mut stream,
			self.first_byte,
			&mut self.head_buf,
			&mut self.buffered,
		)
		.await;

		let fields = &mut self.fields;
		// Plus the first byte.
		fields.upload = stream.read_count() + 1;
		fields.download = 0;
		fields.conn = Some(stream.into_inner());

		let mut head = res?;
		self.tunnel = head.method == Method::CONNECT;
		self.resolve_target(&head.uri)?;
		self.authorize(&mut head.headers, auth)?;

		let fields = &mut self.fields;
		fields.fill_log_fields();
		if !self.tunnel {
			remove_prefixed(&mut head.headers, "proxy-");
			if !head.headers.contains_key(USER_AGENT) {
				head.headers.insert(USER_AGENT, HeaderValue::from_static(""));
			}
			self.request = Some(head);
		}
		fields.update_proxy_ip_num();
		trace!(
			"HTTP handshake done, tunnel: {}, {}",
			self.tunnel,
			fields.log_fields()
		);
		Ok(())
	}

	/// Answer the client with a canned error response.
	///
	/// Uses the write timeout and returns the number of bytes written.
	///
	/// # Errors
	///
	/// Returns an error if there is no connection attached or writing failed.
	pub async fn send_error(&mut self, resp: ErrorResponse, body: &str) -> io::Result<usize> {
		let timeout = self.fields.write_timeout();
		let conn = self.fields.conn.as_mut().ok_or_else(no_connection)?;
		let mut stream = DeadlineStream::new(conn, timeout);
		resp.write_to(&mut stream, body).await
	}

	fn resolve_target(&mut self, uri: &Uri) -> Result<(), Cause> {
		let hostport = target_host_port(uri);
		if hostport.is_empty() {
			return Err(Cause::NotAuthoritative);
		}
		let (host, port) = if hostport.contains(':') {
			let (host, port) = split_host_port(hostport)?;
			(host, parse_port(port)?)
		} else if self.tunnel {
			(hostport, 443)
		} else {
			match uri.scheme_str() {
				Some("http") => (hostport, 80),
				Some("https") => (hostport, 443),
				_ => return Err(Cause::UnknownScheme),
			}
		};

		let fields = &mut self.fields;
		fields.set_port(port);
		if let Ok(ip) = IpAddr::from_str(host) {
			fields.set_host_ip(ip);
		} else {
			fields.set_host_name(host);
		}
		Ok(())
	}

	fn authorize<A>(&mut self, headers: &mut HeaderMap, auth: &A) -> Result<(), Error>
	where
		A: Authorizer + ?Sized,
	{
		let fields = &mut self.fields;
		fields.login.clear();
		fields.password.clear();

		let result = auth.ip_auth(&fields.proxy_ip, &fields.user_ip);
		if result.ok {
			fields.set_ip_identity(&result);
			return Ok(());
		}

		let value = match headers.get(PROXY_AUTHORIZATION) {
			Some(value) if !value.is_empty() => value,
			_ => return Err(Error::Auth(Cause::IpAuthFailed)),
		};
		let decoded = decode_basic_auth(value.as_bytes())?;
		let credentials = String::from_utf8_lossy(&decoded);
		let (login, password) = credentials
			.split_once(':')
			.unwrap_or((&*credentials, ""));
		fields.set_credentials(login, password);

		let result = auth.credentials_auth(&fields.proxy_ip, &fields.login, &fields.password);
		if !result.ok {
			return Err(Error::Auth(Cause::BadCredentials));
		}
		fields.set_identity(&result);

		if result.backconnect {
			fields.package_id = parse_id_header(headers, X_PACKAGE_ID)?;
			fields.user_id = parse_id_header(headers, X_USER_ID)?;
			let user_ip = headers
				.get(X_CLIENT_IP)
				.map(|v| String::from_utf8_lossy(v.as_bytes()))
				.filter(|v| !v.is_empty())
				.ok_or(Cause::NoBackconnectUserIp)?;
			fields.set_user_ip(&user_ip);
			if !self.tunnel {
				for name in &[X_PACKAGE_ID, X_USER_ID, X_CLIENT_IP] {
					headers.remove(*name);
				}
			}
		}
		Ok(())
	}
}

/// Read and parse the request head.
///
/// Bytes the reader fetched past the head are appended to `buffered`.
async fn read_head<S>(
	stream: S,
	first_byte: u8,
	buf: &mut Vec<u8>,
	buffered: &mut Vec<u8>,
) -> Result<RequestHead, Cause>
where
	S: AsyncRead + Unpin,
{
	buf.clear();
	let mut reader =
		BufReader::with_capacity(READ_BUFFER_SIZE, PrefixedStream::new([first_byte], stream));
	read_until(&mut reader, CRLF_2, buf, MAX_HEADER_SIZE)
		.await
		.map_err(|e| match e {
			ReadUntilError::TooLarge(_) => Cause::HeadTooLarge,
			ReadUntilError::Io(e) => Cause::RequestReadFailed(Some(e)),
		})?;
	buffered.extend_from_slice(reader.buffer());
	parse_head(buf)
}

fn parse_head(buf: &[u8]) -> Result<RequestHead, Cause> {
	let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_NUM];
	let mut req = httparse::Request::new(&mut headers);
	match req.parse(buf) {
		Ok(httparse::Status::Complete(_)) => {}
		Ok(httparse::Status::Partial) | Err(_) => return Err(Cause::RequestReadFailed(None)),
	}
	let (method, path, version) = match (req.method, req.path, req.version) {
		(Some(method), Some(path), Some(version)) => (method, path, version),
		_ => return Err(Cause::RequestReadFailed(None)),
	};

	let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
		.map_err(|_| Cause::RequestReadFailed(None))?;
	let uri = Uri::from_str(path).map_err(|_| Cause::RequestReadFailed(None))?;
	let version = get_version(version)?;
	let mut map = HeaderMap::with_capacity(req.headers.len());
	append_headers(&mut map, req.headers)?;
	Ok(RequestHead {
		method,
		uri,
		version,
		headers: map,
	})
}

/// `host[:port]` part of the request target, without user info.
fn target_host_port(uri: &Uri) -> &str {
	uri.authority().map_or("", |authority| {
		let s = authority.as_str();
		s.rfind('@').map_or(s, |pos| &s[pos + 1..])
	})
}

fn parse_id_header(headers: &HeaderMap, name: &'static str) -> Result<i64, Cause> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.unwrap_or("")
		.parse()
		.map_err(|e| Cause::InvalidIdHeader(name, e))
}
