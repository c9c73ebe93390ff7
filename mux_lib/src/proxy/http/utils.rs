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

use super::Cause;
use crate::prelude::*;
use http::{header::HeaderName, HeaderMap, HeaderValue, Version};

pub(super) const MAX_HEADERS_NUM: usize = 128;

pub(super) fn put_http_headers<B: BufMut>(buf: &mut B, headers: &HeaderMap) {
	// Each header field takes up one line
	for (name, value) in headers {
		// [name]: [value]
		buf.put_slice(name.as_str().as_bytes());
		buf.put_slice(&b": "[..]);
		buf.put_slice(value.as_bytes());
		buf.put_slice(CRLF);
	}
}

pub(super) fn get_version(ver: u8) -> Result<Version, Cause> {
	Ok(match ver {
		1 => Version::HTTP_11,
		0 => Version::HTTP_10,
		_ => return Err(Cause::RequestReadFailed(None)),
	})
}

pub(super) fn version_to_bytes(v: Version) -> &'static [u8] {
	match v {
		Version::HTTP_09 => b"HTTP/0.9",
		Version::HTTP_10 => b"HTTP/1.0",
		Version::HTTP_2 => b"HTTP/2",
		Version::HTTP_3 => b"HTTP/3",
		_ => b"HTTP/1.1",
	}
}

/// Append every parsed header to `headers`, keeping repeated fields.
pub(super) fn append_headers(
	headers: &mut HeaderMap,
	parsed_headers: &[httparse::Header<'_>],
) -> Result<(), Cause> {
	for header in parsed_headers {
		let key = HeaderName::from_bytes(header.name.as_bytes())
			.map_err(|_| Cause::RequestReadFailed(None))?;
		let val =
			HeaderValue::from_bytes(header.value).map_err(|_| Cause::RequestReadFailed(None))?;
		headers.append(key, val);
	}
	Ok(())
}

/// Remove every header whose name starts with `prefix` (lower case).
pub(super) fn remove_prefixed(headers: &mut HeaderMap, prefix: &str) {
	while let Some(name) = headers
		.keys()
		.find(|name| name.as_str().starts_with(prefix))
		.cloned()
	{
		headers.remove(name);
	}
}

/// Split `host:port` or `[host]:port` into host and port.
pub(super) fn split_host_port(hostport: &str) -> Result<(&str, &str), Cause> {
	if let Some(rest) = hostport.strip_prefix('[') {
		let end = rest.find(']').ok_or(Cause::InvalidAddress("missing ']' in address"))?;
		let host = &rest[..end];
		let port = rest[end + 1..]
			.strip_prefix(':')
			.ok_or(Cause::InvalidAddress("missing port in address"))?;
		if port.contains(':') {
			return Err(Cause::InvalidAddress("too many colons in address"));
		}
		return Ok((host, port));
	}
	let pos = hostport
		.rfind(':')
		.ok_or(Cause::InvalidAddress("missing port in address"))?;
	let (host, port) = (&hostport[..pos], &hostport[pos + 1..]);
	if host.contains(':') {
		return Err(Cause::InvalidAddress("too many colons in address"));
	}
	if host.contains('[') || host.contains(']') {
		return Err(Cause::InvalidAddress("unexpected bracket in address"));
	}
	Ok((host, port))
}

/// Parse a port, which must be in `1..=65535`.
pub(super) fn parse_port(port: &str) -> Result<u16, Cause> {
	let num: i64 = port.parse()?;
	if (1..=i64::from(u16::MAX)).contains(&num) {
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		Ok(num as u16)
	} else {
		Err(Cause::BadPort)
	}
}

/// Decode the credentials of a `Basic` authorization value.
pub(super) fn decode_basic_auth(value: &[u8]) -> Result<Vec<u8>, Cause> {
	const PREFIX: &[u8] = b"basic ";
	if value.len() < PREFIX.len() || !value[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
		return Err(Cause::NotBasicAuth);
	}
	Ok(base64::decode(&value[PREFIX.len()..])?)
}
