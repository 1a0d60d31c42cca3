use std::num::NonZero;

use crate::error::Result;
use crate::pal::Storage;
use crate::{MAILBOX_ELEMENT_LEN, ProtocolViolation, SharedDir, WorkerState};

/// Proof that a worker's mailbox contents have landed on shared storage.
///
/// Only [`Mailbox::publish()`] creates one, and [`Barrier::enter_after_publish()`] consumes it.
/// This enforces that the stage counter telling peers to read a mailbox is written only after
/// that mailbox has been published.
///
/// [`Barrier::enter_after_publish()`]: crate::Barrier::enter_after_publish
#[derive(Debug)]
#[must_use = "the receipt must be handed to the barrier that follows the publish"]
pub struct Published {
    worker: usize,
    stage: u64,
}

impl Published {
    /// The worker that published.
    #[must_use]
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// The stage that the publishing worker will enter next.
    #[must_use]
    pub fn stage(&self) -> u64 {
        self.stage
    }
}

/// A worker's single-slot mailbox plus the local buffer it is filled from.
///
/// The same buffer serves as the compute output, the publish source and the consume
/// destination, so its contents after a consume are the peer's, not ours.
#[derive(Debug)]
pub struct Mailbox {
    values: Vec<i64>,

    // Reused encoding buffer, so the hot path does not allocate. It holds one partition plus a
    // spare byte that only a consume of an oversized mailbox ever fills.
    bytes: Vec<u8>,
}

impl Mailbox {
    /// Creates a mailbox of `partition_size` zeroed elements.
    #[must_use]
    pub fn new(partition_size: NonZero<usize>) -> Self {
        let len = partition_size.get();

        Self {
            values: vec![0; len],
            bytes: vec![0; len.saturating_mul(MAILBOX_ELEMENT_LEN).saturating_add(1)],
        }
    }

    fn partition_bytes(&self) -> usize {
        self.bytes.len().saturating_sub(1)
    }

    /// The local buffer.
    #[must_use]
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// The local buffer, for the compute phase to fill.
    #[must_use]
    pub fn values_mut(&mut self) -> &mut [i64] {
        &mut self.values
    }

    /// Overwrites this worker's mailbox file with the local buffer in a single write.
    ///
    /// The data is flushed to storage before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox file cannot be written.
    pub fn publish(&mut self, shared: &SharedDir, state: &WorkerState) -> Result<Published> {
        let partition_bytes = self.partition_bytes();
        let (encoded, _spare) = self.bytes.split_at_mut(partition_bytes);

        for (chunk, value) in encoded
            .chunks_exact_mut(MAILBOX_ELEMENT_LEN)
            .zip(&self.values)
        {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }

        let path = shared.mailbox_path(state.id());

        shared
            .storage()
            .overwrite(&path, encoded, true)
            .map_err(SharedDir::io_error(path))?;

        Ok(Published {
            worker: state.id(),
            stage: state.next_stage(),
        })
    }

    /// Reads `peer`'s mailbox into the local buffer and checks that it starts with the
    /// peer's sentinel value.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Protocol`] if the mailbox is not exactly one partition long or does
    /// not start with the sentinel, and [`RunError::Io`] if it cannot be read at all.
    ///
    /// [`RunError::Protocol`]: crate::RunError::Protocol
    /// [`RunError::Io`]: crate::RunError::Io
    pub fn consume(&mut self, shared: &SharedDir, state: &WorkerState, peer: usize) -> Result<()> {
        let path = shared.mailbox_path(peer);
        let expected_bytes = self.partition_bytes();

        let read = shared
            .storage()
            .read_into(&path, &mut self.bytes)
            .map_err(SharedDir::io_error(path))?;

        // The spare byte got filled, so the peer wrote a larger partition than ours.
        if read > expected_bytes {
            return Err(ProtocolViolation::OversizedMailbox {
                peer,
                expected_bytes,
            }
            .into());
        }

        if read < expected_bytes {
            return Err(ProtocolViolation::TruncatedMailbox {
                peer,
                expected_bytes,
                observed_bytes: read,
            }
            .into());
        }

        let decoded = self
            .bytes
            .chunks_exact(MAILBOX_ELEMENT_LEN)
            .filter_map(|chunk| <[u8; MAILBOX_ELEMENT_LEN]>::try_from(chunk).ok())
            .map(i64::from_ne_bytes);

        for (value, decoded) in self.values.iter_mut().zip(decoded) {
            *value = decoded;
        }

        let expected = state.sentinel_for(peer);
        let observed = self.values.first().copied().unwrap_or_default();

        if observed != expected {
            return Err(ProtocolViolation::SentinelMismatch {
                peer,
                expected,
                observed,
                stage: state.next_stage(),
            }
            .into());
        }

        Ok(())
    }
}
