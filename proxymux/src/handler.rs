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

use crate::relay::relay as relay_streams;
use async_trait::async_trait;
use log::{debug, info, trace, warn};
use mux_lib::{
	protocol::{Address, DialError, ErrorKind, Fields},
	proxy::{
		http::ErrorResponse,
		socks5::{CommandCode, ReplyCode},
	},
	Authorizer, BoxStream, Dialer, Handler, HttpRequest, Socks4Request, Socks5Request,
};
use std::{
	io,
	net::{Ipv4Addr, SocketAddr},
	time::Duration,
};
use tokio::{
	io::AsyncWriteExt,
	net::{lookup_host, TcpStream},
	time::timeout,
};

const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";

/// Dials targets directly.
pub struct DirectDialer {
	connect_timeout: Duration,
}

impl DirectDialer {
	pub fn new(connect_timeout: Duration) -> Self {
		Self { connect_timeout }
	}
}

#[async_trait]
impl Dialer for DirectDialer {
	async fn dial_tcp(&self, host: &str, port: u16) -> Result<BoxStream, DialError> {
		trace!("Dialing TCP connection to '{}:{}'", host, port);
		let addrs: Vec<SocketAddr> = lookup_host((host, port))
			.await
			.map_err(DialError::Resolve)?
			.collect();
		if addrs.is_empty() {
			return Err(DialError::Resolve(io::ErrorKind::NotFound.into()));
		}
		let stream = match timeout(self.connect_timeout, TcpStream::connect(&addrs[..])).await {
			Ok(res) => res.map_err(DialError::Connect)?,
			Err(_) => return Err(DialError::Timeout),
		};
		Ok(stream.into())
	}
}

/// Dials the requested target and relays traffic until either side closes.
pub struct RelayHandler;

impl RelayHandler {
	async fn dial(fields: &Fields) -> Result<BoxStream, DialError> {
		let dialer = fields
			.dialer_tcp
			.clone()
			.ok_or_else(|| DialError::Connect(io::ErrorKind::NotConnected.into()))?;
		let res = dialer.dial_tcp(&fields.host, fields.port_num).await;
		if let Err(e) = &res {
			debug!(
				"Error occurred when dialing '{}:{}' ({})",
				fields.host, fields.port, e
			);
		}
		res
	}
}

#[async_trait]
impl Handler for RelayHandler {
	async fn socks4(&self, req: &mut Socks4Request, auth: &dyn Authorizer) {
		if let Err(e) = req.read(auth).await {
			warn!("{} ({})", e, req.fields.log_fields());
			if e.kind() != ErrorKind::Timeout {
				let res = req.send_reply(false).await;
				count_reply(&mut req.fields, res);
			}
			return;
		}
		let target = match Self::dial(&req.fields).await {
			Ok(target) => target,
			Err(_) => {
				let res = req.send_reply(false).await;
				count_reply(&mut req.fields, res);
				return;
			}
		};
		let res = req.send_reply(true).await;
		if count_reply(&mut req.fields, res) {
			relay(&mut req.fields, target, &[]).await;
		}
	}

	async fn socks5(&self, req: &mut Socks5Request, auth: &dyn Authorizer) {
		if let Err(e) = req.read(auth).await {
			warn!("{} ({})", e, req.fields.log_fields());
			if e.kind() == ErrorKind::CommandFailure {
				let code = match e.cause() {
					mux_lib::proxy::socks5::Cause::UnknownAddressType(_) => {
						ReplyCode::AddressTypeNotSupported
					}
					_ => ReplyCode::CommandNotSupported,
				};
				let res = req.send_fail_reply(code).await;
				count_reply(&mut req.fields, res);
			}
			return;
		}
		if req.command != Some(CommandCode::Connect) {
			debug!("Unsupported SOCKS5 command {:?}", req.command);
			let res = req.send_fail_reply(ReplyCode::CommandNotSupported).await;
			count_reply(&mut req.fields, res);
			return;
		}
		let target = match Self::dial(&req.fields).await {
			Ok(target) => target,
			Err(e) => {
				let code = match e {
					DialError::Resolve(_) => ReplyCode::HostUnreachable,
					DialError::Connect(_) => ReplyCode::ConnectionRefused,
					DialError::Timeout => ReplyCode::TtlExpired,
				};
				let res = req.send_fail_reply(code).await;
				count_reply(&mut req.fields, res);
				return;
			}
		};
		let bound = Address::from(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0));
		let res = req.send_success_reply(&bound).await;
		if count_reply(&mut req.fields, res) {
			relay(&mut req.fields, target, &[]).await;
		}
	}

	async fn http(&self, req: &mut HttpRequest, auth: &dyn Authorizer) {
		if let Err(e) = req.read(auth).await {
			warn!("{} ({})", e, req.fields.log_fields());
			let resp = match e.kind() {
				ErrorKind::Timeout => return,
				ErrorKind::Auth => ErrorResponse::ProxyAuthRequired,
				ErrorKind::BadRequest | ErrorKind::CommandFailure => ErrorResponse::BadRequest,
			};
			let res = req.send_error(resp, "").await;
			count_reply(&mut req.fields, res);
			return;
		}
		let target = match Self::dial(&req.fields).await {
			Ok(target) => target,
			Err(e) => {
				let resp = match e {
					DialError::Resolve(_) => ErrorResponse::DnsResolutionFailed,
					DialError::Connect(_) | DialError::Timeout => {
						ErrorResponse::TargetConnectionFailed
					}
				};
				let res = req.send_error(resp, &e.to_string()).await;
				count_reply(&mut req.fields, res);
				return;
			}
		};

		let mut first_packet = Vec::with_capacity(1024 + req.buffered.len());
		if let Some(head) = &req.request {
			head.write_to(&mut first_packet);
		} else if let Some(conn) = req.fields.conn.as_mut() {
			if let Err(e) = conn.write_all(CONNECTION_ESTABLISHED).await {
				debug!("Cannot reply to CONNECT request ({})", e);
				return;
			}
			req.fields.download += CONNECTION_ESTABLISHED.len() as u64;
		}
		first_packet.extend_from_slice(&req.buffered);
		relay(&mut req.fields, target, &first_packet).await;
	}

	async fn exit(&self, conn: Option<BoxStream>) {
		if let Some(mut conn) = conn {
			let _ = conn.shutdown().await;
		}
	}
}

/// Add a reply sent to the client to the download counter.
///
/// Returns false if the reply could not be sent.
fn count_reply(fields: &mut Fields, res: io::Result<usize>) -> bool {
	match res {
		Ok(n) => {
			fields.download += n as u64;
			true
		}
		Err(e) => {
			debug!("Cannot send reply to {} ({})", fields.user_ip, e);
			false
		}
	}
}

/// Send `first_packet` to `target`, then relay between `target` and the client
/// until both are closed or the connection stays idle for the read timeout.
async fn relay(fields: &mut Fields, mut target: BoxStream, first_packet: &[u8]) {
	let idle_timeout = fields.read_timeout();
	let conn = match fields.conn.as_mut() {
		Some(conn) => conn,
		None => return,
	};
	if !first_packet.is_empty() {
		if let Err(e) = target.write_all(first_packet).await {
			debug!("Cannot write to target ({})", e);
			return;
		}
	}
	let (transferred, res) = relay_streams(conn, &mut target, idle_timeout).await;
	fields.upload += transferred.upload;
	fields.download += transferred.download;
	if let Err(e) = res {
		debug!("Relay stopped ({})", e);
	}
	info!(
		"{} upload={} download={}",
		fields.log_fields(),
		fields.upload,
		fields.download
	);
}
