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
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

const SERVER_LINE: &str = "Server: FaaS v1.3-20220203-7fa38bd5af\r\n";
const CONTENT_TYPE_LINE: &str = "Content-Type: text/plain; charset=utf-8\r\n";
const CONNECTION_CLOSE_LINE: &str = "Connection: close\r\n";

const DATE_FORMAT: &[FormatItem<'static>] = format_description!(
	"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Canned responses sent to HTTP clients when a request cannot be served.
///
/// Clients key off the `X-Request-Error` token, so the output of
/// [`ErrorResponse::put`] must stay byte for byte stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorResponse {
	BadRequest,
	ProxyAuthRequired,
	Blocked,
	DnsResolutionFailed,
	Ipv6NotSupported,
	TargetConnectionFailed,
	TargetCommunicationFailed,
	RatelimitReached,
}

impl ErrorResponse {
	#[must_use]
	pub fn status_line(self) -> &'static str {
		match self {
			Self::BadRequest => "HTTP/1.1 400 Bad Request\r\n",
			Self::ProxyAuthRequired => "HTTP/1.1 407 Proxy Authentication Required\r\n",
			Self::Blocked => "HTTP/1.1 451 Unavailable For Legal Reasons\r\n",
			Self::DnsResolutionFailed => "HTTP/1.1 570 DNS Resolution Failed\r\n",
			Self::Ipv6NotSupported => "HTTP/1.1 571 IPv6 Not Supported\r\n",
			Self::TargetConnectionFailed => "HTTP/1.1 572 Target Host Connection Failed\r\n",
			Self::TargetCommunicationFailed => "HTTP/1.1 573 Target Host Communication Error\r\n",
			Self::RatelimitReached => "HTTP/1.1 529 Proxy Ratelimit Reached\r\n",
		}
	}

	/// Header line identifying the category.
	#[must_use]
	pub fn category_line(self) -> &'static str {
		match self {
			Self::BadRequest => "X-Request-Error: BAD_REQUEST\r\n",
			Self::ProxyAuthRequired => "Proxy-Authenticate: Basic realm=\"Proxy\"\r\n",
			Self::Blocked => "X-Request-Error: TARGET_HOST_IS_BLOCKED\r\n",
			Self::DnsResolutionFailed => "X-Request-Error: TARGET_HOST_DNS_RESOLUTION_FAILED\r\n",
			Self::Ipv6NotSupported => "X-Request-Error: IPV6_NOT_SUPPORTED\r\n",
			Self::TargetConnectionFailed => "X-Request-Error: TARGET_HOST_CONNECTION_FAILED\r\n",
			Self::TargetCommunicationFailed => {
				"X-Request-Error: TARGET_HOST_COMMUNICATION_FAILED\r\n"
			}
			Self::RatelimitReached => "X-Request-Error: PROXY_RATELIMIT_REACHED\r\n",
		}
	}

	/// Put the whole response into `buf`.
	///
	/// `date` is the value of the `Date` header.
	/// Content headers are only written if `body` is not empty.
	pub fn put<B: BufMut>(self, buf: &mut B, date: &str, body: &str) {
		buf.put_slice(self.status_line().as_bytes());
		buf.put_slice(SERVER_LINE.as_bytes());
		buf.put_slice(b"Date: ");
		buf.put_slice(date.as_bytes());
		buf.put_slice(CRLF);
		if !body.is_empty() {
			buf.put_slice(CONTENT_TYPE_LINE.as_bytes());
			buf.put_slice(b"Content-Length: ");
			buf.put_slice(body.len().to_string().as_bytes());
			buf.put_slice(CRLF);
		}
		buf.put_slice(self.category_line().as_bytes());
		buf.put_slice(CONNECTION_CLOSE_LINE.as_bytes());
		buf.put_slice(CRLF);
		buf.put_slice(body.as_bytes());
	}

	/// Write the response dated now into `w`.
	///
	/// Returns the number of bytes written.
	///
	/// # Errors
	///
	/// Returns any error from `w`.
	pub async fn write_to<W>(self, w: &mut W, body: &str) -> io::Result<usize>
	where
		W: AsyncWrite + Unpin,
	{
		let date = http_date(OffsetDateTime::now_utc())?;
		let mut buf = Vec::with_capacity(256 + body.len());
		self.put(&mut buf, &date, body);
		w.write_all(&buf).await?;
		w.flush().await?;
		Ok(buf.len())
	}
}

/// Format `t` (which must be UTC) like `Mon, 02 Jan 2006 15:04:05 GMT`.
fn http_date(t: OffsetDateTime) -> io::Result<String> {
	t.format(DATE_FORMAT)
		.map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
