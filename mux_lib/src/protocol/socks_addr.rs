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

use crate::prelude::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::{
	borrow::Cow,
	fmt::{self, Display},
	io,
};

/// Minimal serialized length of each address type, including ATYP and port.
const IPV4_LEN: usize = 1 + 4 + 2;
const IPV6_LEN: usize = 1 + 16 + 2;
/// ATYP, name length and port, without the name itself.
const NAME_OVERHEAD: usize = 1 + 1 + 2;

/// Longest serialized address (a 255 bytes name).
pub const MAX_ADDR_LEN: usize = NAME_OVERHEAD + u8::MAX as usize;

// See more at <https://tools.ietf.org/html/rfc1928>
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum AddrType {
	Ipv4 = 1_u8,
	Name = 3_u8,
	Ipv6 = 4_u8,
}

impl AddrType {
	#[inline]
	#[must_use]
	pub const fn val(self) -> u8 {
		self as u8
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
	#[error("unknown address type {0}")]
	UnknownAddressType(u8),
	#[error("slice of {buf_len} bytes is too short, which required at least {exp_len} bytes")]
	TooShort { buf_len: usize, exp_len: usize },
	#[error("domain of {0} bytes is too long")]
	NameTooLong(usize),
	#[error("IO error ({0})")]
	Io(#[from] io::Error),
}

// -------------------------------------------------------
//                       Address
// -------------------------------------------------------

/// A SOCKS5 address with its textual forms computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
	atyp: AddrType,
	value: Vec<u8>,
	port: u16,
	str_addr: String,
	str_addr_with_port: String,
}

impl Address {
	/// Creates an address from raw `value` bytes.
	///
	/// `value` must be 4 bytes for [`AddrType::Ipv4`], 16 bytes for
	/// [`AddrType::Ipv6`], or at most 255 bytes for [`AddrType::Name`].
	///
	/// # Errors
	///
	/// Return [`ReadError::TooShort`] if an IP value has the wrong length,
	/// or [`ReadError::NameTooLong`] if a name is longer than 255 bytes.
	pub fn new(atyp: AddrType, value: Vec<u8>, port: u16) -> Result<Self, ReadError> {
		let exp_len = match atyp {
			AddrType::Ipv4 => Some(4),
			AddrType::Ipv6 => Some(16),
			AddrType::Name => None,
		};
		match exp_len {
			Some(exp_len) if value.len() != exp_len => {
				return Err(ReadError::TooShort {
					buf_len: value.len(),
					exp_len,
				});
			}
			None if value.len() > u8::MAX as usize => {
				return Err(ReadError::NameTooLong(value.len()));
			}
			_ => {}
		}
		Ok(Self::new_unchecked(atyp, value, port))
	}

	/// Creates a hostname address.
	///
	/// # Errors
	///
	/// Return [`ReadError::NameTooLong`] if `name` is longer than 255 bytes.
	#[inline]
	pub fn new_name(name: &str, port: u16) -> Result<Self, ReadError> {
		Self::new(AddrType::Name, name.as_bytes().to_vec(), port)
	}

	fn new_unchecked(atyp: AddrType, value: Vec<u8>, port: u16) -> Self {
		let str_addr = match atyp {
			AddrType::Ipv4 | AddrType::Ipv6 => ip_from_bytes(&value)
				.map(|ip| ip.to_string())
				.unwrap_or_default(),
			AddrType::Name => String::from_utf8_lossy(&value).into_owned(),
		};
		let str_addr_with_port = if atyp == AddrType::Ipv6 {
			format!("[{}]:{}", str_addr, port)
		} else {
			format!("{}:{}", str_addr, port)
		};
		Self {
			atyp,
			value,
			port,
			str_addr,
			str_addr_with_port,
		}
	}

	#[inline]
	#[must_use]
	pub fn atyp(&self) -> AddrType {
		self.atyp
	}

	/// Raw address bytes, without ATYP, length prefix or port.
	#[inline]
	#[must_use]
	pub fn value(&self) -> &[u8] {
		&self.value
	}

	#[inline]
	#[must_use]
	pub fn port(&self) -> u16 {
		self.port
	}

	/// IP or hostname as text.
	#[inline]
	#[must_use]
	pub fn str_addr(&self) -> &str {
		&self.str_addr
	}

	/// `host:port`, with IPv6 hosts in brackets.
	#[inline]
	#[must_use]
	pub fn str_addr_with_port(&self) -> &str {
		&self.str_addr_with_port
	}

	/// Returns the IP if this is not a hostname.
	#[inline]
	#[must_use]
	pub fn ip(&self) -> Option<IpAddr> {
		match self.atyp {
			AddrType::Ipv4 | AddrType::Ipv6 => ip_from_bytes(&self.value),
			AddrType::Name => None,
		}
	}

	// ***Deserialize

	/// Parse an address at the start of `buf`.
	///
	/// `buf` must be in the following format:
	/// ```not_rust
	/// +------+----------------+----------------+
	/// | ATYP |  Destination   |     Port       |
	/// +------+----------------+----------------+
	/// | u8   | various bytes  |   2 bytes      |
	/// |      |                | big endian u16 |
	/// +------+----------------+----------------+
	/// ```
	/// Returns the address and the number of bytes it took.
	///
	/// # Errors
	///
	/// Return [`ReadError::TooShort`] if `buf` ends before the address does,
	/// or [`ReadError::UnknownAddressType`] for an unknown ATYP.
	pub fn from_slice(buf: &[u8]) -> Result<(Self, usize), ReadError> {
		let too_short = |exp_len: usize| ReadError::TooShort {
			buf_len: buf.len(),
			exp_len,
		};
		let atyp_num = *buf.first().ok_or_else(|| too_short(1))?;
		let atyp =
			AddrType::try_from(atyp_num).map_err(|_| ReadError::UnknownAddressType(atyp_num))?;
		let (value, total_len) = match atyp {
			AddrType::Ipv4 => {
				if buf.len() < IPV4_LEN {
					return Err(too_short(IPV4_LEN));
				}
				(&buf[1..5], IPV4_LEN)
			}
			AddrType::Ipv6 => {
				if buf.len() < IPV6_LEN {
					return Err(too_short(IPV6_LEN));
				}
				(&buf[1..17], IPV6_LEN)
			}
			AddrType::Name => {
				let name_len = usize::from(*buf.get(1).ok_or_else(|| too_short(2))?);
				let total_len = NAME_OVERHEAD + name_len;
				if buf.len() < total_len {
					return Err(too_short(total_len));
				}
				(&buf[2..2 + name_len], total_len)
			}
		};
		let port = u16::from_be_bytes([buf[total_len - 2], buf[total_len - 1]]);
		Ok((Self::new_unchecked(atyp, value.to_vec(), port), total_len))
	}

	/// Read an address from stream `r`.
	///
	/// If `atyp_hint` is 0, the ATYP byte is read from `r` first,
	/// otherwise `atyp_hint` is used as ATYP and the stream is expected
	/// to start right at the destination.
	///
	/// # Errors
	///
	/// Return [`ReadError::UnknownAddressType`] for an unknown ATYP,
	/// or [`ReadError::Io`] if reading failed.
	pub async fn async_read_from<R>(r: &mut R, atyp_hint: u8) -> Result<Self, ReadError>
	where
		R: AsyncRead + Unpin,
	{
		let mut buf = [0_u8; MAX_ADDR_LEN];
		let (atyp, len, port) = read_raw(r, atyp_hint, &mut buf).await?;
		Ok(Self::new_unchecked(atyp, buf[..len].to_vec(), port))
	}

	// ***Serialize

	/// Return the number of bytes it will take to store the serialized address.
	#[inline]
	#[must_use]
	pub fn serialized_len(&self) -> usize {
		match self.atyp {
			AddrType::Ipv4 => IPV4_LEN,
			AddrType::Ipv6 => IPV6_LEN,
			AddrType::Name => NAME_OVERHEAD + self.value.len(),
		}
	}

	/// Write the address into `buf` in the format described in [`Address::from_slice`].
	#[allow(clippy::cast_possible_truncation)]
	pub fn write_to<B: BufMut>(&self, buf: &mut B) {
		buf.put_u8(self.atyp.val());
		if self.atyp == AddrType::Name {
			// Checked in constructors.
			buf.put_u8(self.value.len() as u8);
		}
		buf.put_slice(&self.value);
		buf.put_u16(self.port);
	}
}

/// Target of a request, borrowing a hostname from the read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination<'a> {
	Ip(IpAddr),
	Name(Cow<'a, str>),
}

/// Read an address from `r` into `buf` without allocating.
///
/// `atyp_hint` works as in [`Address::async_read_from`].
/// Returns the destination and the port.
///
/// # Errors
///
/// Same as [`Address::async_read_from`].
pub async fn read_destination<'a, R>(
	r: &mut R,
	atyp_hint: u8,
	buf: &'a mut [u8; MAX_ADDR_LEN],
) -> Result<(Destination<'a>, u16), ReadError>
where
	R: AsyncRead + Unpin,
{
	let (atyp, len, port) = read_raw(r, atyp_hint, buf).await?;
	let value: &'a [u8] = &buf[..len];
	let dst = match atyp {
		AddrType::Ipv4 => {
			let mut octets = [0_u8; 4];
			octets.copy_from_slice(value);
			Destination::Ip(Ipv4Addr::from(octets).into())
		}
		AddrType::Ipv6 => {
			let mut octets = [0_u8; 16];
			octets.copy_from_slice(value);
			Destination::Ip(Ipv6Addr::from(octets).into())
		}
		AddrType::Name => Destination::Name(String::from_utf8_lossy(value)),
	};
	Ok((dst, port))
}

/// Read ATYP (unless hinted), the destination and the port.
///
/// The destination is left at the start of `buf`.
/// Returns the address type, the destination length and the port.
async fn read_raw<R>(
	r: &mut R,
	atyp_hint: u8,
	buf: &mut [u8; MAX_ADDR_LEN],
) -> Result<(AddrType, usize, u16), ReadError>
where
	R: AsyncRead + Unpin,
{
	let atyp_num = if atyp_hint == 0 {
		r.read_u8().await?
	} else {
		atyp_hint
	};
	let atyp = AddrType::try_from(atyp_num).map_err(|_| ReadError::UnknownAddressType(atyp_num))?;
	let value_len = match atyp {
		AddrType::Ipv4 => 4,
		AddrType::Ipv6 => 16,
		AddrType::Name => usize::from(r.read_u8().await?),
	};
	let raw = &mut buf[..value_len + 2];
	r.read_exact(raw).await?;
	let port = u16::from_be_bytes([raw[value_len], raw[value_len + 1]]);
	Ok((atyp, value_len, port))
}

fn ip_from_bytes(value: &[u8]) -> Option<IpAddr> {
	if let Ok(v4) = <[u8; 4]>::try_from(value) {
		Some(Ipv4Addr::from(v4).into())
	} else if let Ok(v6) = <[u8; 16]>::try_from(value) {
		Some(Ipv6Addr::from(v6).into())
	} else {
		None
	}
}

// --- Traits ---

impl Display for Address {
	#[inline]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.str_addr_with_port)
	}
}

impl From<SocketAddr> for Address {
	#[inline]
	fn from(addr: SocketAddr) -> Self {
		match addr.ip() {
			IpAddr::V4(ip) => Self::new_unchecked(AddrType::Ipv4, ip.octets().to_vec(), addr.port()),
			IpAddr::V6(ip) => Self::new_unchecked(AddrType::Ipv6, ip.octets().to_vec(), addr.port()),
		}
	}
}

impl From<(IpAddr, u16)> for Address {
	#[inline]
	fn from((ip, port): (IpAddr, u16)) -> Self {
		SocketAddr::new(ip, port).into()
	}
}

// -------------------------------------------------------
//                          Tests
// -------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	const LINK_LOCAL: [u8; 16] = [
		0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0x42, 0xc3, 0xff, 0xfe, 0x55, 0xb6, 0x36,
	];

	fn test_inputs() -> Vec<(Vec<u8>, AddrType, &'static str, &'static str, u16)> {
		vec![
			(
				{
					let mut buf = vec![];
					buf.put_u8(AddrType::Ipv4.val());
					buf.put_slice(&[127, 0, 0, 1]);
					buf.put_u16(8080);
					buf
				},
				AddrType::Ipv4,
				"127.0.0.1",
				"127.0.0.1:8080",
				8080,
			),
			(
				{
					let mut buf = vec![];
					buf.put_u8(AddrType::Ipv6.val());
					buf.put_slice(&LINK_LOCAL);
					buf.put_u16(257);
					buf
				},
				AddrType::Ipv6,
				"fe80::42:c3ff:fe55:b636",
				"[fe80::42:c3ff:fe55:b636]:257",
				257,
			),
			(
				{
					let name = "example.org";
					let mut buf = vec![];
					buf.put_u8(AddrType::Name.val());
					buf.put_u8(name.len() as u8);
					buf.put_slice(name.as_bytes());
					buf.put_u16(443);
					buf
				},
				AddrType::Name,
				"example.org",
				"example.org:443",
				443,
			),
		]
	}

	#[test]
	fn test_from_slice() {
		for (input, atyp, str_addr, with_port, port) in test_inputs() {
			let mut data = input.clone();
			// Trailing bytes are not part of the address.
			data.extend_from_slice(b"tail");
			let (addr, len) = Address::from_slice(&data).unwrap();
			assert_eq!(len, input.len(), "wrong length for {:?}", input);
			assert_eq!(addr.atyp(), atyp);
			assert_eq!(addr.port(), port);
			assert_eq!(addr.str_addr(), str_addr);
			assert_eq!(addr.str_addr_with_port(), with_port);
			assert_eq!(addr.serialized_len(), input.len());

			let mut buf = Vec::new();
			addr.write_to(&mut buf);
			assert_eq!(buf, input, "cannot write {:?} back", addr);
		}
	}

	#[test]
	fn test_from_slice_too_short() {
		for (input, _, _, _, _) in test_inputs() {
			for len in 0..input.len() {
				let res = Address::from_slice(&input[..len]);
				assert!(
					matches!(res, Err(ReadError::TooShort { .. })),
					"{:?} should be too short",
					&input[..len]
				);
			}
		}
	}

	#[test]
	fn test_from_slice_unknown_type() {
		for atyp in [0_u8, 2, 5, 0xff] {
			let res = Address::from_slice(&[atyp, 1, 2, 3, 4, 5, 6]);
			assert!(matches!(res, Err(ReadError::UnknownAddressType(n)) if n == atyp));
		}
	}

	#[test]
	fn test_async_read_from() {
		let rt = tokio::runtime::Runtime::new().unwrap();
		rt.block_on(async move {
			for (input, atyp, str_addr, with_port, port) in test_inputs() {
				// Type byte read from the stream.
				let addr = Address::async_read_from(&mut input.as_slice(), 0)
					.await
					.unwrap();
				assert_eq!(addr.str_addr_with_port(), with_port);
				// Type byte given as a hint.
				let addr = Address::async_read_from(&mut &input[1..], atyp.val())
					.await
					.unwrap();
				assert_eq!(addr.atyp(), atyp);
				assert_eq!(addr.str_addr(), str_addr);
				assert_eq!(addr.port(), port);
			}
			let e = Address::async_read_from(&mut &[7_u8, 0, 0][..], 0)
				.await
				.unwrap_err();
			assert!(matches!(e, ReadError::UnknownAddressType(7)));
			let e = Address::async_read_from(&mut &[1_u8, 0, 0][..], 0)
				.await
				.unwrap_err();
			assert!(matches!(e, ReadError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
		});
	}

	#[test]
	fn test_read_destination() {
		let rt = tokio::runtime::Runtime::new().unwrap();
		rt.block_on(async move {
			let mut buf = [0_u8; MAX_ADDR_LEN];
			for (input, atyp, str_addr, _, port) in test_inputs() {
				let (dst, p) = read_destination(&mut &input[1..], atyp.val(), &mut buf)
					.await
					.unwrap();
				assert_eq!(p, port);
				match dst {
					Destination::Ip(ip) => {
						assert_ne!(atyp, AddrType::Name);
						assert_eq!(ip.to_string(), str_addr);
					}
					Destination::Name(name) => {
						assert_eq!(atyp, AddrType::Name);
						assert!(matches!(name, Cow::Borrowed("example.org")));
					}
				}
			}

			let mut data = vec![AddrType::Name.val(), 3];
			data.extend_from_slice(b"a\xffb");
			data.put_u16(80);
			let (dst, port) = read_destination(&mut data.as_slice(), 0, &mut buf)
				.await
				.unwrap();
			assert_eq!(port, 80);
			assert_eq!(dst, Destination::Name(Cow::Owned("a\u{fffd}b".into())));

			let e = read_destination(&mut &[2_u8][..], 0, &mut buf)
				.await
				.unwrap_err();
			assert!(matches!(e, ReadError::UnknownAddressType(2)));
		});
	}

	#[test]
	fn test_from_socket_addr() {
		let addr = Address::from(SocketAddr::from_str("[::1]:1080").unwrap());
		assert_eq!(addr.atyp(), AddrType::Ipv6);
		assert_eq!(addr.to_string(), "[::1]:1080");
		assert_eq!(addr.ip(), Some(IpAddr::from(Ipv6Addr::LOCALHOST)));
		let addr = Address::from((IpAddr::from([10, 1, 2, 3]), 53));
		assert_eq!(addr.value(), &[10, 1, 2, 3]);
		assert_eq!(addr.to_string(), "10.1.2.3:53");
	}

	#[test]
	fn test_new_checks_length() {
		assert!(Address::new(AddrType::Ipv4, vec![1, 2, 3], 1).is_err());
		assert!(Address::new(AddrType::Ipv6, vec![0; 4], 1).is_err());
		assert!(Address::new_name(&"a".repeat(256), 1).is_err());
		let addr = Address::new_name(&"a".repeat(255), 1).unwrap();
		assert_eq!(addr.serialized_len(), MAX_ADDR_LEN);
	}
}
