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

use crate::proxy::{http::HttpRequest, socks4::Socks4Request, socks5::Socks5Request};
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Default number of idle instances kept by each pool.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Something that can be reused across connections.
pub trait Recycle {
	/// Create a fresh instance for a pool miss.
	fn new_pooled() -> Self;

	/// Drop every external reference and reset growable buffers
	/// without releasing their capacity.
	fn recycle(&mut self);
}

/// Thread safe free list of boxed `T`.
pub struct Pool<T> {
	idle: Mutex<Vec<Box<T>>>,
	max_idle: usize,
}

impl<T: Recycle> Pool<T> {
	#[must_use]
	pub fn new(max_idle: usize) -> Self {
		Self {
			idle: Mutex::new(Vec::new()),
			max_idle,
		}
	}

	/// Take an idle instance, or allocate one if there is none.
	///
	/// The instance goes back to the pool when the guard is dropped.
	pub fn get(&self) -> Pooled<'_, T> {
		let item = self.idle.lock().pop();
		let item = item.unwrap_or_else(|| Box::new(T::new_pooled()));
		Pooled {
			item: Some(item),
			pool: self,
		}
	}

	/// Recycle `item` and keep it if the pool is not full.
	pub fn put(&self, mut item: Box<T>) {
		item.recycle();
		let mut idle = self.idle.lock();
		if idle.len() < self.max_idle {
			idle.push(item);
		}
	}

	/// Number of idle instances.
	#[must_use]
	pub fn idle_len(&self) -> usize {
		self.idle.lock().len()
	}
}

impl<T: Recycle> Default for Pool<T> {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_IDLE)
	}
}

/// Guard returning its instance to the pool on drop.
pub struct Pooled<'a, T: Recycle> {
	item: Option<Box<T>>,
	pool: &'a Pool<T>,
}

impl<T: Recycle> Deref for Pooled<'_, T> {
	type Target = T;

	fn deref(&self) -> &T {
		match &self.item {
			Some(item) => item,
			None => unreachable!("pooled item used after release"),
		}
	}
}

impl<T: Recycle> DerefMut for Pooled<'_, T> {
	fn deref_mut(&mut self) -> &mut T {
		match &mut self.item {
			Some(item) => item,
			None => unreachable!("pooled item used after release"),
		}
	}
}

impl<T: Recycle> Drop for Pooled<'_, T> {
	fn drop(&mut self) {
		if let Some(item) = self.item.take() {
			self.pool.put(item);
		}
	}
}

/// One pool per protocol engine.
#[derive(Default)]
pub struct Pools {
	pub socks4: Pool<Socks4Request>,
	pub socks5: Pool<Socks5Request>,
	pub http: Pool<HttpRequest>,
}

impl Pools {
	#[must_use]
	pub fn new(max_idle: usize) -> Self {
		Self {
			socks4: Pool::new(max_idle),
			socks5: Pool::new(max_idle),
			http: Pool::new(max_idle),
		}
	}
}
