//! Sliding-window rate limiter with a cooldown.

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::config::RateLimit;

/// Accepted-message instants within the current window, plus a cooldown
/// deadline. A message arriving while the window is full is dropped and
/// starts the cooldown; everything is dropped until the cooldown ends.
#[derive(Debug)]
pub struct RateLimiter {
	limit: RateLimit,
	bucket: VecDeque<Instant>,
	blocked_until: Option<Instant>,
}

impl RateLimiter {
	pub fn new(limit: RateLimit) -> Self {
		Self {
			limit,
			bucket: VecDeque::new(),
			blocked_until: None,
		}
	}

	/// Records an arrival at `now` and reports whether it may proceed.
	pub fn check(&mut self, now: Instant) -> bool {
		if self.blocked_until.is_some_and(|until| now < until) {
			return false;
		}

		let window = self.limit.window();
		while self
			.bucket
			.front()
			.is_some_and(|t| now.saturating_duration_since(*t) >= window)
		{
			self.bucket.pop_front();
		}

		if self.bucket.len() >= self.limit.max {
			self.blocked_until = Some(now + self.limit.cooldown());
			return false;
		}

		self.bucket.push_back(now);
		true
	}

	pub fn is_blocked(&self, now: Instant) -> bool {
		self.blocked_until.is_some_and(|until| now < until)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	fn limiter(max: usize) -> RateLimiter {
		RateLimiter::new(RateLimit {
			window_ms: 1_000,
			max,
			cooldown_ms: 1_500,
		})
	}

	#[tokio::test(start_paused = true)]
	async fn accepts_up_to_max_then_cools_down() {
		let mut rl = limiter(3);
		let t0 = Instant::now();

		assert!(rl.check(t0));
		assert!(rl.check(t0));
		assert!(rl.check(t0));
		assert!(!rl.check(t0));
		assert!(rl.is_blocked(t0));

		// Window has rolled over but the cooldown has not.
		assert!(!rl.check(t0 + Duration::from_millis(1_200)));
		assert!(rl.check(t0 + Duration::from_millis(1_500)));
	}

	#[tokio::test(start_paused = true)]
	async fn window_slides() {
		let mut rl = limiter(2);
		let t0 = Instant::now();

		assert!(rl.check(t0));
		assert!(rl.check(t0 + Duration::from_millis(600)));
		assert!(rl.check(t0 + Duration::from_millis(1_000)));
		assert!(!rl.is_blocked(t0 + Duration::from_millis(1_000)));
	}
}
