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

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[forbid(unsafe_code)]
pub mod mux;
#[forbid(unsafe_code)]
pub mod pool;
#[forbid(unsafe_code)]
mod prelude;
#[forbid(unsafe_code)]
pub mod protocol;
#[forbid(unsafe_code)]
pub mod proxy;
#[cfg(test)]
#[forbid(unsafe_code)]
mod test_utils;
#[forbid(unsafe_code)]
pub mod utils;

pub use mux::{Handler, Incoming, Mux};
pub use pool::{Pool, Pooled, Pools, Recycle};
pub use protocol::{
	AuthResult, Authorizer, BoxStream, Dialer, ErrorKind, Fields, HostType, Timeouts,
	TimeoutsBuilder,
};
pub use proxy::{http::HttpRequest, socks4::Socks4Request, socks5::Socks5Request};
