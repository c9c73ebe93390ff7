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

use async_trait::async_trait;
use mux_lib::{
	protocol::{Address, DialError},
	proxy::socks5::CommandCode,
	AuthResult, Authorizer, BoxStream, Dialer, Fields, Handler, HttpRequest, Incoming, Mux,
	Socks4Request, Socks5Request, Timeouts,
};
use std::{
	net::{Ipv4Addr, SocketAddr},
	sync::Arc,
};
use tokio::{
	io::{copy_bidirectional, AsyncReadExt, AsyncWriteExt},
	net::{TcpListener, TcpStream},
};

pub const LOGIN: &str = "user";
pub const PASSWORD: &str = "pass";

pub fn setup_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// Accepts `LOGIN:PASSWORD`, and every client when `allow_ip` is set.
pub struct TestAuthorizer {
	pub allow_ip: bool,
}

impl Authorizer for TestAuthorizer {
	fn ip_auth(&self, _proxy_ip: &str, _user_ip: &str) -> AuthResult {
		AuthResult {
			ok: self.allow_ip,
			package_id: 1,
			user_id: 11,
			..AuthResult::default()
		}
	}

	fn credentials_auth(&self, _proxy_ip: &str, login: &str, password: &str) -> AuthResult {
		AuthResult {
			ok: login == LOGIN && password == PASSWORD,
			package_id: 2,
			user_id: 22,
			..AuthResult::default()
		}
	}
}

struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
	async fn dial_tcp(&self, host: &str, port: u16) -> Result<BoxStream, DialError> {
		let stream = TcpStream::connect((host, port))
			.await
			.map_err(DialError::Connect)?;
		Ok(stream.into())
	}
}

struct RelayHandler;

async fn dial(fields: &Fields) -> Option<BoxStream> {
	let dialer = fields.dialer_tcp.clone()?;
	dialer.dial_tcp(&fields.host, fields.port_num).await.ok()
}

async fn relay(fields: &mut Fields, mut target: BoxStream, first_packet: &[u8]) {
	target.write_all(first_packet).await.unwrap();
	if let Some(conn) = fields.conn.as_mut() {
		let _ = copy_bidirectional(conn, &mut target).await;
	}
}

#[async_trait]
impl Handler for RelayHandler {
	async fn socks4(&self, req: &mut Socks4Request, auth: &dyn Authorizer) {
		if req.read(auth).await.is_err() {
			let _ = req.send_reply(false).await;
			return;
		}
		if let Some(target) = dial(&req.fields).await {
			req.send_reply(true).await.unwrap();
			relay(&mut req.fields, target, &[]).await;
		} else {
			let _ = req.send_reply(false).await;
		}
	}

	async fn socks5(&self, req: &mut Socks5Request, auth: &dyn Authorizer) {
		if req.read(auth).await.is_err() {
			return;
		}
		assert_eq!(req.command, Some(CommandCode::Connect));
		if let Some(target) = dial(&req.fields).await {
			let bound = Address::from(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0));
			req.send_success_reply(&bound).await.unwrap();
			relay(&mut req.fields, target, &[]).await;
		}
	}

	async fn http(&self, req: &mut HttpRequest, auth: &dyn Authorizer) {
		if req.read(auth).await.is_err() {
			return;
		}
		let target = match dial(&req.fields).await {
			Some(target) => target,
			None => return,
		};
		let mut first_packet = Vec::new();
		if let Some(head) = &req.request {
			head.write_to(&mut first_packet);
		} else if let Some(conn) = req.fields.conn.as_mut() {
			conn.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
				.await
				.unwrap();
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

/// Start a server that sends back everything it receives.
pub async fn spawn_echo_server() -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		loop {
			let (mut stream, _) = listener.accept().await.unwrap();
			tokio::spawn(async move {
				let (mut r, mut w) = stream.split();
				let _ = tokio::io::copy(&mut r, &mut w).await;
			});
		}
	});
	addr
}

/// Start a proxy serving every protocol on a random port.
pub async fn spawn_proxy(auth: TestAuthorizer) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let mux = Arc::new(Mux::new(RelayHandler, Timeouts::default()));
	let auth = Arc::new(auth);
	let dialer: Arc<dyn Dialer> = Arc::new(TcpDialer);
	tokio::spawn(async move {
		loop {
			let (stream, peer) = listener.accept().await.unwrap();
			let mux = mux.clone();
			let auth = auth.clone();
			let dialer = dialer.clone();
			tokio::spawn(async move {
				let proxy_ip = stream.local_addr().unwrap().ip().to_string();
				let user_ip = peer.ip().to_string();
				let incoming = Incoming {
					conn: stream.into(),
					dialer_tcp: Some(dialer),
					dialer_udp: None,
					proxy_ip: &proxy_ip,
					user_ip: &user_ip,
				};
				mux.handle(incoming, auth.as_ref()).await;
			});
		}
	});
	addr
}

pub async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
	let mut buf = vec![0_u8; n];
	stream.read_exact(&mut buf).await.unwrap();
	buf
}
