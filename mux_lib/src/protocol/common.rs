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
use std::io;

pub type BoxStream = Box<dyn AsyncReadWrite>;

// --------------------------------------------
//                AsyncReadWrite
// --------------------------------------------

pub trait AsyncReadWrite: 'static + AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T> AsyncReadWrite for T where T: 'static + AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl From<tokio::net::TcpStream> for Box<dyn AsyncReadWrite> {
	fn from(stream: tokio::net::TcpStream) -> Self {
		Box::new(stream)
	}
}

// --------------------------------------------
//                    Dialer
// --------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DialError {
	#[error("cannot resolve target host ({0})")]
	Resolve(io::Error),
	#[error("cannot connect to target host ({0})")]
	Connect(io::Error),
	#[error("connecting to target host timed out")]
	Timeout,
}

/// Opens outgoing connections once a handshake is done.
///
/// Handshake engines never call it; they only carry it
/// on the request record for whoever relays the traffic.
#[async_trait]
pub trait Dialer: Send + Sync {
	/// Connects to `host:port`, where `host` is either an IP literal
	/// or a name that still has to be resolved.
	async fn dial_tcp(&self, host: &str, port: u16) -> Result<BoxStream, DialError>;
}
