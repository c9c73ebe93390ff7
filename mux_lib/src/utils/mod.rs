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

pub mod deadline;
pub mod prefixed;

pub use deadline::{is_timeout, DeadlineExceeded, DeadlineStream};
pub use prefixed::PrefixedStream;

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, thiserror::Error)]
pub enum ReadUntilError {
	#[error("delimiter not found in the first {0} bytes")]
	TooLarge(usize),
	#[error("{0}")]
	Io(#[from] io::Error),
}

/// Append bytes from `r` to `dst` until `delim` has been appended.
///
/// At most `limit` bytes are appended. Returns the number of bytes
/// appended, `delim` included. Bytes after `delim` stay in `r`.
///
/// # Errors
///
/// [`ReadUntilError::TooLarge`] if `limit` bytes were read without
/// finding `delim`. An [`io::ErrorKind::UnexpectedEof`] error if `r`
/// ends first.
pub async fn read_until<R>(
	r: &mut R,
	delim: &[u8],
	dst: &mut Vec<u8>,
	limit: usize,
) -> Result<usize, ReadUntilError>
where
	R: AsyncBufRead + Unpin,
{
	debug_assert!(!delim.is_empty());
	let start = dst.len();
	loop {
		let data = r.fill_buf().await?;
		if data.is_empty() {
			return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
		}
		let old_len = dst.len();
		let take = data.len().min(limit - (old_len - start));
		// A delimiter may straddle the previous chunk and this one.
		let from = (old_len + 1).saturating_sub(delim.len()).max(start);
		dst.extend_from_slice(&data[..take]);
		if let Some(pos) = dst[from..].windows(delim.len()).position(|w| w == delim) {
			let end = from + pos + delim.len();
			dst.truncate(end);
			r.consume(end - old_len);
			return Ok(end - start);
		}
		r.consume(take);
		if dst.len() - start >= limit {
			return Err(ReadUntilError::TooLarge(limit));
		}
	}
}
