use ferry_protocol::ServerResponse;

use crate::error::{ClientError, ClientResult};

/// Server-issued blueprint for one transfer: which storage key was
/// granted, how many blocks to send, and how large each one is. The
/// client never chooses its own chunking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferPlan {
    pub storage_key: String,
    pub total_blocks: u32,
    pub block_size: u32,
    pub file_size: u64,
}

impl TransferPlan {
    /// Build a plan from a granted SAVE response.
    ///
    /// The block grid is checked against the announced file size: either
    /// zero blocks for an empty file, or `block_size > 0` with
    /// `(total_blocks - 1) * block_size < file_size <= total_blocks *
    /// block_size`. Anything else means the server and client disagree
    /// about the file, and proceeding would corrupt the transfer.
    pub fn from_response(response: &ServerResponse, file_size: u64) -> ClientResult<Self> {
        let storage_key = response.require_key()?.to_string();
        let total_blocks = narrow(response.require_total_block()?, "total_block")?;
        let block_size = narrow(response.require_block_size()?, "block_size")?;

        if total_blocks == 0 {
            if file_size != 0 {
                return Err(ClientError::InvalidTransferPlan {
                    reason: format!("zero blocks for a {} byte file", file_size),
                });
            }
        } else {
            if block_size == 0 {
                return Err(ClientError::InvalidTransferPlan {
                    reason: "zero block size".into(),
                });
            }
            let span = block_size as u64 * total_blocks as u64;
            let prior = block_size as u64 * (total_blocks as u64 - 1);
            if file_size <= prior || file_size > span {
                return Err(ClientError::InvalidTransferPlan {
                    reason: format!(
                        "{} blocks of {} bytes do not cover {} bytes",
                        total_blocks, block_size, file_size
                    ),
                });
            }
        }

        Ok(Self { storage_key, total_blocks, block_size, file_size })
    }

    /// Byte range `(offset, length)` of block `index`.
    ///
    /// Index must be below `total_blocks`. Every block is `block_size`
    /// bytes except the last, which takes the remainder.
    pub fn block_range(&self, index: u32) -> (u64, u64) {
        let offset = self.block_size as u64 * index as u64;
        let len = if index + 1 == self.total_blocks {
            self.file_size - offset
        } else {
            self.block_size as u64
        };
        (offset, len)
    }

    pub fn is_empty(&self) -> bool {
        self.total_blocks == 0
    }
}

fn narrow(value: u64, field: &str) -> ClientResult<u32> {
    u32::try_from(value).map_err(|_| ClientError::InvalidTransferPlan {
        reason: format!("{} {} out of range", field, value),
    })
}
