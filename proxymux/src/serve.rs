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
	auth::StaticAuthorizer,
	config::Config,
	handler::{DirectDialer, RelayHandler},
	BoxStdErr,
};
use log::{debug, warn};
use mux_lib::{pool::Pools, Authorizer, Dialer, Incoming, Mux};
use rand::RngCore;
use std::{
	io,
	net::{IpAddr, SocketAddr},
	sync::Arc,
};
use tokio::net::TcpListener;

struct Shared {
	mux: Mux<RelayHandler>,
	auth: Arc<dyn Authorizer>,
	dialer: Arc<dyn Dialer>,
	proxy_ip: Option<IpAddr>,
}

/// Accept connections on every listen address until one of them fails.
///
/// # Errors
///
/// Returns an error if there is no listen address,
/// or if binding or accepting failed.
pub async fn serve(conf: Config) -> Result<(), BoxStdErr> {
	if conf.listen.is_empty() {
		return Err("no listen address".into());
	}
	let timeouts = conf.timeouts.build();
	let shared = Arc::new(Shared {
		mux: Mux::with_pools(RelayHandler, timeouts, Pools::new(conf.max_idle)),
		auth: Arc::new(StaticAuthorizer::new(&conf.auth)),
		dialer: Arc::new(DirectDialer::new(timeouts.connect)),
		proxy_ip: conf.proxy_ip,
	});
	let tasks = conf
		.listen
		.iter()
		.map(|addr| serve_listener(*addr, shared.clone()));
	futures::future::try_join_all(tasks).await?;
	Ok(())
}

async fn serve_listener(addr: SocketAddr, shared: Arc<Shared>) -> io::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	warn!("Serving on {}", addr);
	loop {
		let (stream, peer) = listener.accept().await?;
		let shared = shared.clone();
		// randomly generated connection ID
		let conn_id = rand::thread_rng().next_u64();
		tokio::spawn(async move {
			let local_ip = match stream.local_addr() {
				Ok(local) => local.ip(),
				Err(e) => {
					debug!("[{:x}] cannot get local address ({})", conn_id, e);
					return;
				}
			};
			let proxy_ip = shared.proxy_ip.unwrap_or(local_ip).to_string();
			let user_ip = peer.ip().to_string();
			debug!("[{:x}] accepted connection from {}", conn_id, peer);
			let incoming = Incoming {
				conn: stream.into(),
				dialer_tcp: Some(shared.dialer.clone()),
				dialer_udp: None,
				proxy_ip: &proxy_ip,
				user_ip: &user_ip,
			};
			shared.mux.handle(incoming, shared.auth.as_ref()).await;
			debug!("[{:x}] connection from {} closed", conn_id, peer);
		});
	}
}
