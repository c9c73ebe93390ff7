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
	pool::Pools,
	prelude::*,
	protocol::{Authorizer, BoxStream, Dialer, Fields, Timeouts},
	proxy::{
		http::HttpRequest,
		socks4::{self, Socks4Request},
		socks5::{self, Socks5Request},
	},
	utils::DeadlineStream,
};

/// Callbacks driven by [`Mux::handle`].
///
/// Each protocol callback receives a pooled record with the connection
/// attached, and is expected to call the record's `read` method with
/// `auth` before doing anything else with it.
#[async_trait]
pub trait Handler: Send + Sync {
	async fn socks4(&self, req: &mut Socks4Request, auth: &dyn Authorizer);

	async fn socks5(&self, req: &mut Socks5Request, auth: &dyn Authorizer);

	async fn http(&self, req: &mut HttpRequest, auth: &dyn Authorizer);

	/// Called exactly once per connection, after the record has gone back
	/// to its pool.
	///
	/// `conn` is `None` if a protocol callback took the connection away.
	async fn exit(&self, conn: Option<BoxStream>);
}

/// A freshly accepted connection.
pub struct Incoming<'a> {
	pub conn: BoxStream,
	pub dialer_tcp: Option<Arc<dyn Dialer>>,
	/// Only handed to SOCKS5 records.
	pub dialer_udp: Option<Arc<dyn Dialer>>,
	/// Local address the client connected to.
	pub proxy_ip: &'a str,
	/// Remote address of the client.
	pub user_ip: &'a str,
}

/// Sniffs the protocol of incoming connections and dispatches them to a
/// [`Handler`] with a pooled request record.
pub struct Mux<H> {
	timeouts: Arc<Timeouts>,
	pools: Pools,
	handler: H,
}

impl<H: Handler> Mux<H> {
	pub fn new(handler: H, timeouts: Timeouts) -> Self {
		Self::with_pools(handler, timeouts, Pools::default())
	}

	pub fn with_pools(handler: H, timeouts: Timeouts, pools: Pools) -> Self {
		Self {
			timeouts: Arc::new(timeouts),
			pools,
			handler,
		}
	}

	#[inline]
	pub fn handler(&self) -> &H {
		&self.handler
	}

	#[inline]
	pub fn pools(&self) -> &Pools {
		&self.pools
	}

	#[inline]
	pub fn timeouts(&self) -> &Timeouts {
		&self.timeouts
	}

	/// Read the first byte of `incoming.conn` and run the matching
	/// protocol callback:
	/// - `5`: SOCKS5
	/// - `4`: SOCKS4/SOCKS4a
	/// - `'A'..='Z'`: HTTP (first letter of the method)
	///
	/// Any other byte, or failing to read one within the handshake timeout,
	/// runs no callback.
	/// [`Handler::exit`] is always called last.
	pub async fn handle(&self, incoming: Incoming<'_>, auth: &dyn Authorizer) {
		let Incoming {
			mut conn,
			dialer_tcp,
			dialer_udp,
			proxy_ip,
			user_ip,
		} = incoming;

		let first_byte = {
			let mut stream = DeadlineStream::new(&mut conn, self.timeouts.handshake);
			stream.read_u8().await
		};
		let first_byte = match first_byte {
			Ok(b) => b,
			Err(e) => {
				debug!("Cannot read first byte from {}: {}", user_ip, e);
				self.handler.exit(Some(conn)).await;
				return;
			}
		};

		let conn = match first_byte {
			socks5::VER5 => {
				let mut req = self.pools.socks5.get();
				self.attach(&mut req.fields, conn, dialer_tcp, proxy_ip, user_ip);
				req.fields.dialer_udp = dialer_udp;
				self.handler.socks5(&mut req, auth).await;
				req.fields.conn.take()
			}
			socks4::VER4 => {
				let mut req = self.pools.socks4.get();
				self.attach(&mut req.fields, conn, dialer_tcp, proxy_ip, user_ip);
				self.handler.socks4(&mut req, auth).await;
				req.fields.conn.take()
			}
			b'A'..=b'Z' => {
				let mut req = self.pools.http.get();
				req.first_byte = first_byte;
				self.attach(&mut req.fields, conn, dialer_tcp, proxy_ip, user_ip);
				self.handler.http(&mut req, auth).await;
				req.fields.conn.take()
			}
			_ => {
				debug!(
					"Unknown protocol from {}, first byte: {:#04x}",
					user_ip, first_byte
				);
				Some(conn)
			}
		};
		self.handler.exit(conn).await;
	}

	fn attach(
		&self,
		fields: &mut Fields,
		conn: BoxStream,
		dialer_tcp: Option<Arc<dyn Dialer>>,
		proxy_ip: &str,
		user_ip: &str,
	) {
		fields.conn = Some(conn);
		fields.timeouts = Some(self.timeouts.clone());
		fields.dialer_tcp = dialer_tcp;
		fields.proxy_ip.clear();
		fields.proxy_ip.push_str(proxy_ip);
		fields.user_ip.clear();
		fields.user_ip.push_str(user_ip);
	}
}
