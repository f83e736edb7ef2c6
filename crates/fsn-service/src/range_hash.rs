use std::sync::Arc;

use fsn_crypto::TzHash;
use fsn_object::{RangeStep, RangeTraverser};
use fsn_types::{Address, Checksum, ChecksumType, Header, ObjectId, PayloadRange, SplitInfo};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::context::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use crate::source::Query;

#[derive(Clone, Debug)]
pub struct RangeHashRequest {
    pub address: Address,
    pub ranges: Vec<PayloadRange>,
    pub kind: ChecksumType,
    pub local: bool,
}

/// Distributed payload range hashing.
///
/// Regular objects are hashed by whichever node holds them. For a split
/// object the range is mapped onto its children: Tillich-Zémor hashes of
/// the pieces are concatenated homomorphically, SHA-256 is computed over
/// the fetched piece bytes.
#[derive(Clone)]
pub struct RangeHashService {
    ctx: Arc<ServiceContext>,
}

impl RangeHashService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn range_hash(&self, request: &RangeHashRequest, cancel: &CancelToken) -> ServiceResult<Vec<Checksum>> {
        let mut sums = Vec::with_capacity(request.ranges.len());
        for range in &request.ranges {
            sums.push(self.hash_one(request, *range, cancel).await?);
        }
        Ok(sums)
    }

    async fn hash_one(&self, request: &RangeHashRequest, range: PayloadRange, cancel: &CancelToken) -> ServiceResult<Checksum> {
        let query = Query::Hash {
            range,
            kind: request.kind,
        };
        match self.ctx.first_answer(&request.address, &query, request.local, cancel).await {
            Ok(answer) => answer.into_checksum(),
            Err(ServiceError::SplitInfo(info)) => self.hash_split(request, &info, range, cancel).await,
            Err(e) => Err(e),
        }
    }

    async fn head(&self, address: &Address, raw: bool, local: bool, cancel: &CancelToken) -> ServiceResult<Header> {
        self.ctx
            .first_answer(address, &Query::Head { raw }, local, cancel)
            .await?
            .into_header()
    }

    async fn last_child(&self, request: &RangeHashRequest, info: &SplitInfo, cancel: &CancelToken) -> ServiceResult<ObjectId> {
        if let Some(last) = info.last_part {
            return Ok(last);
        }
        let link = info.link.ok_or(ServiceError::NotFound(request.address))?;
        let header = self.head(&request.address.with_object(link), true, request.local, cancel).await?;
        header
            .children()
            .last()
            .copied()
            .ok_or(ServiceError::UnexpectedAnswer("a linking object without children"))
    }

    async fn hash_split(
        &self,
        request: &RangeHashRequest,
        info: &SplitInfo,
        range: PayloadRange,
        cancel: &CancelToken,
    ) -> ServiceResult<Checksum> {
        let address = &request.address;
        let origin = self.head(address, false, request.local, cancel).await?;
        if !range.fits(origin.payload_length) {
            return Err(ServiceError::OutOfRange {
                range,
                size: origin.payload_length,
            });
        }
        let right = self.last_child(request, info, cancel).await?;
        let right_header = self.head(&address.with_object(right), true, request.local, cancel).await?;
        let mut traverser = RangeTraverser::from_last_child(origin.payload_length, right, &right_header, range)?;

        let mut tz_parts = Vec::new();
        let mut sha = Sha256::new();
        loop {
            match traverser.next_step()? {
                RangeStep::Header(id) => {
                    let header = self.head(&address.with_object(id), true, request.local, cancel).await?;
                    traverser.push_header_of(id, &header)?;
                }
                RangeStep::Read { id, range: piece } => {
                    let child = address.with_object(id);
                    match request.kind {
                        ChecksumType::TillichZemor => {
                            let query = Query::Hash {
                                range: piece,
                                kind: ChecksumType::TillichZemor,
                            };
                            let sum = self
                                .ctx
                                .first_answer(&child, &query, request.local, cancel)
                                .await?
                                .into_checksum()?;
                            tz_parts.push(TzHash::from_slice(&sum.sum)?);
                        }
                        ChecksumType::Sha256 => {
                            let bytes = self
                                .ctx
                                .first_answer(&child, &Query::Range(piece), request.local, cancel)
                                .await?
                                .into_bytes()?;
                            sha.update(&bytes);
                        }
                    }
                    traverser.push_success_size(piece.length);
                }
                RangeStep::Done => break,
            }
        }
        debug!(%address, ?range, pieces = tz_parts.len(), "split range hashed");

        Ok(match request.kind {
            ChecksumType::TillichZemor => {
                Checksum::new(ChecksumType::TillichZemor, TzHash::concat(&tz_parts).to_bytes().to_vec())
            }
            ChecksumType::Sha256 => Checksum::new(ChecksumType::Sha256, sha.finalize().to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Cluster;
    use fsn_crypto::checksum_of;

    fn payload() -> Vec<u8> {
        (0..50u8).collect()
    }

    async fn split_cluster() -> (Cluster, Address) {
        let cluster = Cluster::new(2, &[2]);
        let (parent, children, link) = cluster.split_object(&payload(), 16).await;
        // children spread over both nodes, link only on node 1
        for (i, child) in children.iter().enumerate() {
            cluster.engine(i % 2).put(child).unwrap();
        }
        cluster.engine(1).put(&link).unwrap();
        (cluster, parent)
    }

    fn request(address: Address, ranges: Vec<PayloadRange>, kind: ChecksumType) -> RangeHashRequest {
        RangeHashRequest {
            address,
            ranges,
            kind,
            local: false,
        }
    }

    #[tokio::test]
    async fn regular_object_hash() {
        let cluster = Cluster::new(2, &[1]);
        let obj = cluster.object(b"0123456789");
        cluster.engine(1).put(&obj).unwrap();
        let svc = RangeHashService::new(cluster.context(0));
        let sums = svc
            .range_hash(
                &request(obj.address(), vec![PayloadRange::new(2, 5)], ChecksumType::Sha256),
                &CancelToken::never(),
            )
            .await
            .unwrap();
        assert_eq!(sums, vec![checksum_of(ChecksumType::Sha256, b"23456")]);
    }

    #[tokio::test]
    async fn split_object_hashes_match_direct_hashes() {
        let (cluster, parent) = split_cluster().await;
        let data = payload();
        let svc = RangeHashService::new(cluster.context(0));
        let ranges = vec![
            PayloadRange::new(0, 50),
            PayloadRange::new(10, 20),
            PayloadRange::new(33, 1),
            PayloadRange::new(48, 2),
        ];
        for kind in [ChecksumType::Sha256, ChecksumType::TillichZemor] {
            let sums = svc
                .range_hash(&request(parent, ranges.clone(), kind), &CancelToken::never())
                .await
                .unwrap();
            for (sum, range) in sums.iter().zip(&ranges) {
                let start = range.offset as usize;
                let slice = &data[start..start + range.length as usize];
                assert_eq!(sum, &checksum_of(kind, slice), "{kind:?} {range:?}");
            }
        }
    }

    #[tokio::test]
    async fn split_range_out_of_bounds() {
        let (cluster, parent) = split_cluster().await;
        let svc = RangeHashService::new(cluster.context(0));
        let err = svc
            .range_hash(
                &request(parent, vec![PayloadRange::new(40, 20)], ChecksumType::Sha256),
                &CancelToken::never(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::OutOfRange { size: 50, .. }));
    }
}
