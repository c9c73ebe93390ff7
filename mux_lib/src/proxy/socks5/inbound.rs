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
		Cause, CommandCode, Error, ReplyCode, AUTH_FAILED, AUTH_SUCCESSFUL, SUB_VERS,
		VAL_NO_ACCEPTABLE, VAL_NO_AUTH, VAL_USER_PASS, VER5,
	},
	PROTOCOL_NAME,
};
use crate::{
	pool::Recycle,
	prelude::*,
	protocol::{
		fields::BACKCONNECT_TRAILER_LEN,
		no_connection,
		socks_addr::{read_destination, Address, Destination, MAX_ADDR_LEN},
		Authorizer, Fields, LogValue,
	},
	utils::DeadlineStream,
};
use std::io;

/// Length of a failure reply.
const FAIL_REPLY_LEN: usize = 10;

/// SOCKS5 handshake engine and the record it fills.
///
/// The dispatcher has already consumed the version byte.
pub struct Socks5Request {
	pub fields: Fields,
	/// Command received in the request packet.
	pub command: Option<CommandCode>,
}

impl Recycle for Socks5Request {
	fn new_pooled() -> Self {
		Self {
			fields: Fields::default(),
			command: None,
		}
	}

	fn recycle(&mut self) {
		self.fields.clean();
		self.command = None;
	}
}

impl Socks5Request {
	/// Drive the handshake from the method offer to the end of the
	/// request packet (and the backconnect trailer if there is one).
	///
	/// Every read and write is bounded by the handshake timeout.
	/// The reply to the request is left to the caller,
	/// see [`Socks5Request::send_success_reply`] and [`Socks5Request::send_fail_reply`].
	///
	/// # Errors
	///
	/// Returns [`Error::Auth`] if method negotiation or authorization failed,
	/// or [`Error::Command`] if the request packet cannot be read.
	pub async fn read<A: Authorizer + ?Sized>(&mut self, auth: &A) -> Result<(), Error> {
		let fields = &mut self.fields;
		fields.backconnect = false;
		let user_ip = LogValue::from(fields.user_ip.as_str());
		let proxy_ip = LogValue::from(fields.proxy_ip.as_str());
		fields.push_log_field("user_ip", user_ip);
		fields.push_log_field("proxy_ip", proxy_ip);
		fields.push_log_field("type", PROTOCOL_NAME);

		let conn = fields.take_conn().map_err(|e| Error::Auth(e.into()))?;
		let mut stream = DeadlineStream::new(conn, fields.handshake_timeout());
		let res = self.handshake(&mut stream, auth).await;

		let fields = &mut self.fields;
		fields.download = stream.write_count();
		// Plus the version byte.
		fields.upload = stream.read_count() + 1;
		fields.conn = Some(stream.into_inner());
		res?;

		fields.fill_log_fields();
		fields.update_proxy_ip_num();
		trace!(
			"SOCKS5 handshake done, command: {:?}, {}",
			self.command,
			fields.log_fields()
		);
		Ok(())
	}

	async fn handshake<S, A>(&mut self, stream: &mut S, auth: &A) -> Result<(), Error>
	where
		S: AsyncRead + AsyncWrite + Unpin,
		A: Authorizer + ?Sized,
	{
		self.authorize(stream, auth).await.map_err(Error::Auth)?;
		self.read_command(stream).await.map_err(Error::Command)?;
		if self.fields.backconnect {
			let mut trailer = [0_u8; BACKCONNECT_TRAILER_LEN];
			stream
				.read_exact(&mut trailer)
				.await
				.map_err(|e| Error::Command(e.into()))?;
			self.fields.apply_backconnect(&trailer);
		}
		Ok(())
	}

	/// Method negotiation and optional username/password subnegotiation.
	///
	/// See more at <https://datatracker.ietf.org/doc/html/rfc1929>
	async fn authorize<S, A>(&mut self, stream: &mut S, auth: &A) -> Result<(), Cause>
	where
		S: AsyncRead + AsyncWrite + Unpin,
		A: Authorizer + ?Sized,
	{
		// +----------+----------+
		// | NMETHODS | METHODS  |
		// +----------+----------+
		// |    1     | 1 to 255 |
		// +----------+----------+
		let nmethods = usize::from(stream.read_u8().await?);
		if nmethods == 0 {
			return Err(Cause::NoAuthMethods);
		}
		let mut methods = [0_u8; u8::MAX as usize];
		let methods = &mut methods[..nmethods];
		stream.read_exact(methods).await?;
		let no_auth = methods.contains(&VAL_NO_AUTH);
		let user_pass = methods.contains(&VAL_USER_PASS);

		let fields = &mut self.fields;
		fields.login.clear();
		fields.password.clear();

		let result = auth.ip_auth(&fields.proxy_ip, &fields.user_ip);
		let ip_authorized = result.ok;
		if ip_authorized {
			fields.set_ip_identity(&result);
			if no_auth {
				stream.write_all(&[VER5, VAL_NO_AUTH]).await?;
				return Ok(());
			}
			// Client insists on credentials, which are then ignored.
		}

		if !user_pass {
			stream.write_all(&[VER5, VAL_NO_ACCEPTABLE]).await?;
			return Err(Cause::NoAcceptableMethod);
		}

		debug!("Performing SOCKS5 username/password authentication.");
		stream.write_all(&[VER5, VAL_USER_PASS]).await?;
		read_credentials(stream, fields).await?;

		if !ip_authorized {
			let result = auth.credentials_auth(&fields.proxy_ip, &fields.login, &fields.password);
			if !result.ok {
				stream.write_all(&[SUB_VERS, AUTH_FAILED]).await?;
				return Err(Cause::BadCredentials);
			}
			fields.set_identity(&result);
		}
		stream.write_all(&[SUB_VERS, AUTH_SUCCESSFUL]).await?;
		Ok(())
	}

	/// Read the request in the following format:
	///```not_rust
	/// +----+-----+-------+------+----------+----------+
	/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
	/// +----+-----+-------+------+----------+----------+
	/// | 1  |  1  | X'00' |  1   | Variable |    2     |
	/// +----+-----+-------+------+----------+----------+
	///```
	async fn read_command<S>(&mut self, stream: &mut S) -> Result<(), Cause>
	where
		S: AsyncRead + Unpin,
	{
		let mut header = [0_u8; 4];
		stream.read_exact(&mut header).await?;
		let (ver, cmd, _, atyp) = (header[0], header[1], header[2], header[3]);
		if ver != VER5 {
			return Err(Cause::WrongVersion(ver));
		}
		let cmd = CommandCode::try_from(cmd).map_err(|_| Cause::UnknownCommand(cmd))?;
		self.command = Some(cmd);

		let mut buf = [0_u8; MAX_ADDR_LEN];
		let (dst, port) = read_destination(stream, atyp, &mut buf).await?;
		let fields = &mut self.fields;
		fields.set_port(port);
		match dst {
			Destination::Ip(ip) => fields.set_host_ip(ip),
			Destination::Name(name) => fields.set_host_name(&name),
		}
		Ok(())
	}

	/// Reply to the request with `addr` as the bound address.
	///
	/// Uses the write timeout and returns the number of bytes written.
	///
	/// # Errors
	///
	/// Returns an error if there is no connection attached or writing failed.
	pub async fn send_success_reply(&mut self, addr: &Address) -> io::Result<usize> {
		let mut buf = [0_u8; 3 + MAX_ADDR_LEN];
		let len = 3 + addr.serialized_len();
		{
			let mut dst = &mut buf[..];
			dst.put_slice(&[VER5, ReplyCode::Succeeded.val(), 0]);
			addr.write_to(&mut dst);
		}
		self.write_reply(&buf[..len]).await
	}

	/// Reply to the request with failure `code`.
	///
	/// Uses the write timeout and returns the number of bytes written.
	///
	/// # Errors
	///
	/// Returns an error if there is no connection attached or writing failed.
	pub async fn send_fail_reply(&mut self, code: ReplyCode) -> io::Result<usize> {
		let buf: [u8; FAIL_REPLY_LEN] = [VER5, code.val(), 0, 1, 0, 0, 0, 0, 0, 0];
		self.write_reply(&buf).await
	}

	async fn write_reply(&mut self, buf: &[u8]) -> io::Result<usize> {
		let timeout = self.fields.write_timeout();
		let conn = self.fields.conn.as_mut().ok_or_else(no_connection)?;
		let mut stream = DeadlineStream::new(conn, timeout);
		stream.write_all(buf).await?;
		stream.flush().await?;
		Ok(buf.len())
	}
}

/// Read the username/password request:
///```not_rust
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
///```
async fn read_credentials<S>(stream: &mut S, fields: &mut Fields) -> Result<(), Cause>
where
	S: AsyncRead + Unpin,
{
	let mut header = [0_u8; 2];
	stream.read_exact(&mut header).await?;
	let (ver, ulen) = (header[0], usize::from(header[1]));
	if ver != SUB_VERS {
		return Err(Cause::UserAuthVersion(ver));
	}
	// Username followed by PLEN.
	let mut user = [0_u8; u8::MAX as usize + 1];
	let user = &mut user[..=ulen];
	stream.read_exact(user).await?;
	let plen = usize::from(user[ulen]);
	let mut pass = [0_u8; u8::MAX as usize];
	let pass = &mut pass[..plen];
	stream.read_exact(pass).await?;

	fields.set_credentials(
		&String::from_utf8_lossy(&user[..ulen]),
		&String::from_utf8_lossy(pass),
	);
	Ok(())
}
