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

use std::{
	io,
	pin::Pin,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	task::{Context, Poll},
	time::Duration,
};
use tokio::{
	io::{copy_bidirectional, AsyncRead, AsyncWrite, ReadBuf},
	time::sleep,
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

const ACTIVE: bool = true;
const NOT_ACTIVE: bool = !ACTIVE;

#[derive(Clone)]
struct Switch(Arc<AtomicBool>);

impl Switch {
	fn new(v: bool) -> Self {
		Self(Arc::new(AtomicBool::new(v)))
	}

	fn set(&self, v: bool) {
		self.0.store(v, Ordering::Relaxed);
	}

	fn fetch_and_set(&self, v: bool) -> bool {
		self.0.swap(v, Ordering::Relaxed)
	}
}

/// Stream that counts the bytes read from it
/// and flips `active` on every transfer.
struct Watched<S> {
	inner: S,
	active: Switch,
	read: u64,
}

impl<S> Watched<S> {
	fn new(inner: S, active: Switch) -> Self {
		Self {
			inner,
			active,
			read: 0,
		}
	}
}

impl<S: AsyncRead + Unpin> AsyncRead for Watched<S> {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		let me = self.get_mut();
		let before = buf.filled().len();
		let res = Pin::new(&mut me.inner).poll_read(cx, buf);
		let n = buf.filled().len() - before;
		if n > 0 {
			me.read += n as u64;
			me.active.set(ACTIVE);
		}
		res
	}
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Watched<S> {
	fn poll_write(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<io::Result<usize>> {
		let me = self.get_mut();
		let res = Pin::new(&mut me.inner).poll_write(cx, buf);
		if let Poll::Ready(Ok(n)) = &res {
			if *n > 0 {
				me.active.set(ACTIVE);
			}
		}
		res
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.get_mut().inner).poll_flush(cx)
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
	}
}

/// Bytes moved by [`relay`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Transferred {
	/// Read from the client, written to the target.
	pub upload: u64,
	/// Read from the target, written to the client.
	pub download: u64,
}

/// Copy data between `client` and `target` until both sides are closed,
/// either side fails, or nothing moves in either direction for `idle_timeout`.
///
/// A zero `idle_timeout` never stops the relay.
/// Byte counts are returned even if the relay failed.
pub async fn relay<C, T>(
	client: &mut C,
	target: &mut T,
	idle_timeout: Duration,
) -> (Transferred, io::Result<()>)
where
	C: AsyncRead + AsyncWrite + Unpin + ?Sized,
	T: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
	let active = Switch::new(NOT_ACTIVE);
	let mut client = Watched::new(client, active.clone());
	let mut target = Watched::new(target, active.clone());

	let res = if idle_timeout == Duration::ZERO {
		copy_bidirectional(&mut client, &mut target).await.map(drop)
	} else {
		tokio::select! {
			res = copy_bidirectional(&mut client, &mut target) => res.map(drop),
			() = guard_is_active(active, idle_timeout) => Err(io::Error::new(
				io::ErrorKind::TimedOut,
				"connection not active for too long",
			)),
		}
	};
	let transferred = Transferred {
		upload: client.read,
		download: target.read,
	};
	(transferred, res)
}

async fn guard_is_active(is_active: Switch, idle_timeout: Duration) {
	let tick = std::cmp::min(TICK_INTERVAL, idle_timeout);
	let mut idle = Duration::ZERO;
	loop {
		sleep(tick).await;
		if is_active.fetch_and_set(NOT_ACTIVE) == ACTIVE {
			idle = Duration::ZERO;
		} else {
			idle += tick;
			if idle >= idle_timeout {
				break;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Instant;
	use tokio::{
		io::{duplex, AsyncReadExt, AsyncWriteExt},
		runtime::Runtime,
	};

	#[test]
	fn test_relay_both_ways() {
		Runtime::new().unwrap().block_on(async move {
			let (mut client, mut client_side) = duplex(64);
			let (mut target_side, mut target) = duplex(64);
			let task = tokio::spawn(async move {
				relay(&mut client_side, &mut target_side, Duration::from_secs(5)).await
			});

			client.write_all(b"hello").await.unwrap();
			let mut buf = [0_u8; 5];
			target.read_exact(&mut buf).await.unwrap();
			assert_eq!(&buf, b"hello");

			target.write_all(b"world!").await.unwrap();
			let mut buf = [0_u8; 6];
			client.read_exact(&mut buf).await.unwrap();
			assert_eq!(&buf, b"world!");

			client.shutdown().await.unwrap();
			target.shutdown().await.unwrap();
			let (transferred, res) = task.await.unwrap();
			res.unwrap();
			assert_eq!(
				transferred,
				Transferred {
					upload: 5,
					download: 6
				}
			);
		});
	}

	#[test]
	fn test_relay_idle_timeout() {
		Runtime::new().unwrap().block_on(async move {
			let (mut client, mut client_side) = duplex(64);
			let (mut target_side, _target) = duplex(64);
			client.write_all(b"ping").await.unwrap();

			let start = Instant::now();
			let (transferred, res) =
				relay(&mut client_side, &mut target_side, Duration::from_millis(200)).await;
			let elapsed = start.elapsed();

			assert_eq!(res.unwrap_err().kind(), io::ErrorKind::TimedOut);
			assert_eq!(transferred.upload, 4);
			assert_eq!(transferred.download, 0);
			assert!(elapsed >= Duration::from_millis(200));
			assert!(elapsed < Duration::from_secs(2));
		});
	}

	#[test]
	fn test_relay_activity_resets_idle_timer() {
		Runtime::new().unwrap().block_on(async move {
			let (mut client, mut client_side) = duplex(64);
			let (mut target_side, mut target) = duplex(64);
			let task = tokio::spawn(async move {
				relay(&mut client_side, &mut target_side, Duration::from_millis(300)).await
			});

			// Keep the connection busy for longer than the idle timeout.
			let mut buf = [0_u8; 1];
			for _ in 0..6 {
				sleep(Duration::from_millis(100)).await;
				client.write_all(b"x").await.unwrap();
				target.read_exact(&mut buf).await.unwrap();
			}
			client.shutdown().await.unwrap();
			target.shutdown().await.unwrap();

			let (transferred, res) = task.await.unwrap();
			res.unwrap();
			assert_eq!(transferred.upload, 6);
		});
	}
}
