//! The serialized-mode gate.
//!
//! An async-aware mutual-exclusion state machine packed into a single
//! `AtomicU8`, with futex-based parking via `parking_lot_core`:
//!
//! - Bit 0: SEALED - a durable outcome has been published; no execution will
//!   ever be admitted again.
//! - Bit 1: HELD - one caller's factory execution is in flight.
//! - Bit 2: PARKED - at least one waiter is parked on the gate.
//! - Bits 3-7: EPOCH - generation counter, bumped on every seal/reopen so a
//!   parked waiter never confuses two distinct hold periods.
//!
//! Entering the gate yields a [`GatePass`]. Dropping the pass reopens the
//! gate (the factory failed without capture; the next waiter gets its turn),
//! while [`GatePass::seal`] closes it for good (an outcome was published;
//! waiters wake and read the slot). Either way the gate is released on every
//! exit path of the guarded section.

use core::mem;
use core::sync::atomic::{self, AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Atomic admission state for serialized factory execution.
#[repr(transparent)]
pub(crate) struct Gate(AtomicU8);

impl Gate {
   /// A durable outcome is published.
   const SEALED: u8 = 1;
   /// A factory execution is in flight.
   const HELD: u8 = 2;
   /// At least one waiter is parked.
   const PARKED: u8 = 4;
   /// Start of the epoch bits.
   const EPOCH_1: u8 = 8;
   /// Mask for the epoch bits.
   const EPOCH_MASK: u8 = !(Self::SEALED | Self::HELD | Self::PARKED);

   /// Next epoch value given the current state.
   #[inline(always)]
   const fn next_epoch(current_state: u8) -> u8 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   /// A gate that has admitted nobody yet.
   #[inline]
   pub(crate) const fn new() -> Self {
      Self(AtomicU8::new(0))
   }

   /// A gate that is sealed from the start (pre-resolved cell).
   #[inline]
   pub(crate) const fn sealed() -> Self {
      Self(AtomicU8::new(Self::SEALED))
   }

   /// Wakes every parked waiter.
   #[inline]
   fn unpark_waiters(&self) {
      // SAFETY: The key passed to unpark must match the key used to park.
      // Both sides use the address of the AtomicU8.
      unsafe {
         parking_lot_core::unpark_all(self.0.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the current thread until the state moves away from
   /// `expected_state`.
   #[cfg_attr(not(feature = "rt-multi-thread"), allow(dead_code))]
   #[inline]
   fn park_until_change(&self, expected_state: u8) {
      // SAFETY: See the key comment in `unpark_waiters`.
      unsafe {
         // park() validates the condition closure before sleeping and only
         // sleeps while the state still equals what the caller observed.
         let _ = parking_lot_core::park(
            self.0.as_ptr() as usize,
            || self.0.load(atomic::Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
         // Wake-ups may be spurious; callers re-check the state in a loop.
      }
   }

   /// Transitions to SEALED, bumps the epoch and wakes waiters.
   /// Returns `true` if the gate was not already sealed.
   #[inline]
   fn seal_now(&self) -> bool {
      // Relaxed is enough for the epoch read; the swap below is the Release
      // that orders the slot publication before the state change.
      let current_state = self.0.load(Ordering::Relaxed);
      let new_state = Self::SEALED | Self::next_epoch(current_state);

      let prev_state = self.0.swap(new_state, Ordering::Release);
      if prev_state & Self::PARKED != 0 {
         self.unpark_waiters();
      }
      prev_state & Self::SEALED == 0
   }

   /// Clears SEALED/HELD, bumps the epoch and wakes waiters so the next one
   /// can take its turn.
   #[inline]
   fn reopen(&self) {
      let current_state = self.0.load(Ordering::Relaxed);
      let new_state = Self::next_epoch(current_state);

      let prev_state = self.0.swap(new_state, Ordering::Release);
      if prev_state & Self::PARKED != 0 {
         self.unpark_waiters();
      }
   }

   /// One admission attempt.
   ///
   /// - `Ok(None)`: the gate is sealed; read the slot instead.
   /// - `Ok(Some(pass))`: admitted, the caller's execution is in flight.
   /// - `Err(current_state)`: held by someone else. Unless `nowait`, the
   ///   PARKED flag has been set and the returned state includes it.
   #[inline]
   fn enter_step(&self, nowait: bool) -> Result<Option<GatePass<'_>>, u8> {
      loop {
         // Acquire so that observing SEALED also makes the publication that
         // preceded the seal visible to this caller's slot read.
         let current_state = self.0.load(Ordering::Acquire);
         if current_state & Self::SEALED != 0 {
            return Ok(None);
         }

         if current_state & Self::HELD == 0 {
            let new_state = current_state | Self::HELD;
            match self.0.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Acquire, // See everything the previous holder left behind.
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Some(GatePass::new(self))),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         // Held by someone else. Announce ourselves as parked if needed.
         if !nowait && (current_state & Self::PARKED == 0) {
            let new_state = current_state | Self::PARKED;
            match self.0.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Relaxed,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(new_state),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         return Err(current_state);
      }
   }

   /// Enters the gate, parking the thread if it is held.
   ///
   /// `Some(pass)` once admitted; `None` if the gate sealed in the meantime.
   #[cfg_attr(not(feature = "rt-multi-thread"), allow(dead_code))]
   #[inline]
   fn enter(&self) -> Option<GatePass<'_>> {
      match self.enter_step(false) {
         Ok(pass) => pass,
         Err(mut observed_state) => loop {
            self.park_until_change(observed_state);
            match self.enter_step(false) {
               Ok(pass) => return pass,
               Err(new_state) => observed_state = new_state,
            }
         },
      }
   }

   /// Enters the gate from async context.
   ///
   /// Yields to the scheduler while the holder runs; on a multi-thread
   /// runtime, falls back to parking the worker via `block_in_place` if the
   /// hold outlasts the yield budget.
   #[inline]
   pub(crate) async fn enter_async(&self) -> Option<GatePass<'_>> {
      #[allow(clippy::never_loop)]
      loop {
         for _ in 0..16 {
            match self.enter_step(false) {
               Ok(pass) => return pass,
               Err(observed_state) => {
                  for _ in 0..32 {
                     tokio::task::yield_now().await;
                     if self.0.load(Ordering::Relaxed) != observed_state {
                        break;
                     }
                  }
               }
            }
         }

         #[cfg(feature = "rt-multi-thread")]
         {
            return match self.enter_step(false) {
               Ok(pass) => pass,
               Err(observed_state) => tokio::task::block_in_place(|| {
                  self.park_until_change(observed_state);
                  self.enter()
               }),
            };
         }
      }
   }
}

/// RAII admission pass returned by [`Gate::enter`] / [`Gate::enter_async`].
///
/// Dropping the pass reopens the gate; [`GatePass::seal`] closes it for good.
pub(crate) struct GatePass<'a> {
   gate: &'a Gate,
}

impl<'a> GatePass<'a> {
   /// Assumes the HELD flag is already set on `gate`.
   #[inline(always)]
   const fn new(gate: &'a Gate) -> Self {
      Self { gate }
   }

   /// Seals the gate: the published outcome is durable, waiters wake and
   /// read the slot. Consumes the pass.
   #[inline(always)]
   pub(crate) fn seal(self) {
      self.gate.seal_now();
      mem::forget(self); // Drop would reopen.
   }
}

impl Drop for GatePass<'_> {
   /// The execution ended without a durable outcome (uncaptured failure or
   /// unwind). Reopen so the next waiter can take its turn.
   #[inline(always)]
   fn drop(&mut self) {
      self.gate.reopen();
   }
}
