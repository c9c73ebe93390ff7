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
	io,
	task::{Context, Poll},
};
use tokio::io::ReadBuf;

/// Stream that yields `N` bytes already consumed from `inner`
/// before reading from `inner` again.
///
/// Writes go straight to `inner`.
pub struct PrefixedStream<S, const N: usize> {
	prefix: [u8; N],
	pos: usize,
	inner: S,
}

impl<S, const N: usize> PrefixedStream<S, N> {
	#[inline]
	pub fn new(prefix: [u8; N], inner: S) -> Self {
		Self {
			prefix,
			pos: 0,
			inner,
		}
	}

	/// Prefix bytes not yet read.
	#[inline]
	pub fn remaining_prefix(&self) -> &[u8] {
		&self.prefix[self.pos..]
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

impl<S: AsyncRead + Unpin, const N: usize> AsyncRead for PrefixedStream<S, N> {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		dst_buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		let me = self.get_mut();
		if me.pos < N {
			let src = &me.prefix[me.pos..];
			let len = std::cmp::min(src.len(), dst_buf.remaining());
			dst_buf.put_slice(&src[..len]);
			me.pos += len;
			return Ok(()).into();
		}
		Pin::new(&mut me.inner).poll_read(cx, dst_buf)
	}
}

impl<S: AsyncWrite + Unpin, const N: usize> AsyncWrite for PrefixedStream<S, N> {
	#[inline]
	fn poll_write(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &[u8],
	) -> Poll<io::Result<usize>> {
		Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
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
