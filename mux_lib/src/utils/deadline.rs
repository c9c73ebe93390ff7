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
use std::{
	future::Future,
	io,
	task::{Context, Poll},
	time::Duration,
};
use tokio::{
	io::ReadBuf,
	time::{sleep, Sleep},
};

/// Marker carried by the error a [`DeadlineStream`] returns
/// when a deadline elapses before any byte was transferred.
#[derive(Debug, thiserror::Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

/// Returns true if `e` was produced by an elapsed deadline.
#[must_use]
pub fn is_timeout(e: &io::Error) -> bool {
	e.kind() == io::ErrorKind::UnexpectedEof
		&& e.get_ref()
			.map_or(false, |inner| inner.is::<DeadlineExceeded>())
}

fn deadline_error() -> io::Error {
	io::Error::new(io::ErrorKind::UnexpectedEof, DeadlineExceeded)
}

/// Stream wrapper that bounds every read and every write.
///
/// A deadline is armed at `now + timeout` when an operation starts
/// and cleared as soon as the operation completes,
/// so an idle stream never carries a stale deadline into the next call.
///
/// An operation that completes with data is never cut short,
/// one that is still pending when the deadline elapses
/// fails with [`io::ErrorKind::UnexpectedEof`] (see [`is_timeout`]).
pub struct DeadlineStream<S> {
	inner: S,
	read_timeout: Duration,
	write_timeout: Duration,
	read_deadline: Option<Pin<Box<Sleep>>>,
	write_deadline: Option<Pin<Box<Sleep>>>,
	read_count: u64,
	write_count: u64,
}

impl<S> DeadlineStream<S> {
	#[inline]
	pub fn new(inner: S, timeout: Duration) -> Self {
		Self::with_timeouts(inner, timeout, timeout)
	}

	#[inline]
	pub fn with_timeouts(inner: S, read_timeout: Duration, write_timeout: Duration) -> Self {
		Self {
			inner,
			read_timeout,
			write_timeout,
			read_deadline: None,
			write_deadline: None,
			read_count: 0,
			write_count: 0,
		}
	}

	/// Number of bytes read through this stream so far.
	#[inline]
	pub fn read_count(&self) -> u64 {
		self.read_count
	}

	/// Number of bytes written through this stream so far.
	#[inline]
	pub fn write_count(&self) -> u64 {
		self.write_count
	}

	#[inline]
	pub fn get_ref(&self) -> &S {
		&self.inner
	}

	#[inline]
	pub fn get_mut(&mut self) -> &mut S {
		&mut self.inner
	}

	#[inline]
	pub fn into_inner(self) -> S {
		self.inner
	}
}

/// Poll `deadline`, arming it first if needed.
///
/// Returns `Ready` once it has elapsed.
fn poll_deadline(
	deadline: &mut Option<Pin<Box<Sleep>>>,
	timeout: Duration,
	cx: &mut Context<'_>,
) -> Poll<()> {
	let sleep = deadline.get_or_insert_with(|| Box::pin(sleep(timeout)));
	sleep.as_mut().poll(cx)
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		let me = self.get_mut();
		let filled = buf.filled().len();
		match Pin::new(&mut me.inner).poll_read(cx, buf) {
			Poll::Ready(res) => {
				me.read_deadline = None;
				me.read_count += (buf.filled().len() - filled) as u64;
				Poll::Ready(res)
			}
			Poll::Pending => {
				match poll_deadline(&mut me.read_deadline, me.read_timeout, cx) {
					Poll::Ready(()) => {
						me.read_deadline = None;
						Poll::Ready(Err(deadline_error()))
					}
					Poll::Pending => Poll::Pending,
				}
			}
		}
	}
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
	fn poll_write(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<io::Result<usize>> {
		let me = self.get_mut();
		match Pin::new(&mut me.inner).poll_write(cx, buf) {
			Poll::Ready(res) => {
				me.write_deadline = None;
				if let Ok(n) = &res {
					me.write_count += *n as u64;
				}
				Poll::Ready(res)
			}
			Poll::Pending => {
				match poll_deadline(&mut me.write_deadline, me.write_timeout, cx) {
					Poll::Ready(()) => {
						me.write_deadline = None;
						Poll::Ready(Err(deadline_error()))
					}
					Poll::Pending => Poll::Pending,
				}
			}
		}
	}

	#[inline]
	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.get_mut().inner).poll_flush(cx)
	}

	#[inline]
	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::duplex;

	const SHORT: Duration = Duration::from_millis(50);

	#[test]
	fn test_read_timeout() {
		let task = async move {
			let (a, _b) = duplex(64);
			let mut stream = DeadlineStream::new(a, SHORT);
			let mut buf = [0_u8; 4];
			let e = stream.read(&mut buf).await.unwrap_err();
			assert!(is_timeout(&e), "wrong error {:?}", e);
			assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
			assert_eq!(stream.read_count(), 0);
		};
		tokio::runtime::Runtime::new().unwrap().block_on(task);
	}

	#[test]
	fn test_partial_read_is_not_error() {
		let task = async move {
			let (a, mut b) = duplex(64);
			let mut stream = DeadlineStream::new(a, SHORT);
			b.write_all(&[1, 2]).await.unwrap();
			let mut buf = [0_u8; 4];
			let n = stream.read(&mut buf).await.unwrap();
			assert_eq!(&buf[..n], &[1, 2]);
			assert_eq!(stream.read_count(), 2);

			// The next read gets a fresh deadline.
			tokio::time::sleep(SHORT * 2).await;
			b.write_all(&[3]).await.unwrap();
			let n = stream.read(&mut buf).await.unwrap();
			assert_eq!(&buf[..n], &[3]);
			assert_eq!(stream.read_count(), 3);
		};
		tokio::runtime::Runtime::new().unwrap().block_on(task);
	}

	#[test]
	fn test_write_timeout() {
		let task = async move {
			let (a, _b) = duplex(4);
			let mut stream = DeadlineStream::with_timeouts(a, Duration::from_secs(10), SHORT);
			stream.write_all(&[0_u8; 4]).await.unwrap();
			assert_eq!(stream.write_count(), 4);
			let e = stream.write_all(&[0_u8; 4]).await.unwrap_err();
			assert!(is_timeout(&e), "wrong error {:?}", e);
		};
		tokio::runtime::Runtime::new().unwrap().block_on(task);
	}

	#[test]
	fn test_other_errors_pass_through() {
		let e = io::Error::new(io::ErrorKind::UnexpectedEof, "early eof");
		assert!(!is_timeout(&e));
		assert!(is_timeout(&deadline_error()));
	}
}
