use fsn_crypto::checksum_of;
use fsn_engine::StorageEngine;
use fsn_object::format::validate;
use fsn_placement::{LocalInfo, NodeInfo};
use fsn_types::{Address, Checksum, ChecksumType, Header, Object, PayloadRange};

use crate::cancel::CancelToken;
use crate::client::RemoteClient;
use crate::error::{ServiceError, ServiceResult};

/// Single-answer requests a node can serve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    Head { raw: bool },
    Range(PayloadRange),
    Hash { range: PayloadRange, kind: ChecksumType },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Answer {
    Header(Header),
    Bytes(Vec<u8>),
    Checksum(Checksum),
}

impl Answer {
    pub fn into_header(self) -> ServiceResult<Header> {
        match self {
            Answer::Header(h) => Ok(h),
            _ => Err(ServiceError::UnexpectedAnswer("a non-header payload")),
        }
    }

    pub fn into_bytes(self) -> ServiceResult<Vec<u8>> {
        match self {
            Answer::Bytes(b) => Ok(b),
            _ => Err(ServiceError::UnexpectedAnswer("a non-range payload")),
        }
    }

    pub fn into_checksum(self) -> ServiceResult<Checksum> {
        match self {
            Answer::Checksum(c) => Ok(c),
            _ => Err(ServiceError::UnexpectedAnswer("a non-checksum payload")),
        }
    }
}

/// Where one placement node is served from.
pub enum Source<'a> {
    Local(&'a StorageEngine),
    Remote {
        client: &'a dyn RemoteClient,
        node: &'a NodeInfo,
    },
}

impl<'a> Source<'a> {
    /// The local engine if `node` is this node, otherwise the client.
    pub fn resolve(
        node: &'a NodeInfo,
        local: &LocalInfo,
        engine: &'a StorageEngine,
        client: &'a dyn RemoteClient,
    ) -> Self {
        if local.is_local(node) {
            Source::Local(engine)
        } else {
            Source::Remote { client, node }
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Source::Local(_))
    }

    pub async fn query(&self, address: &Address, query: &Query, cancel: &CancelToken) -> ServiceResult<Answer> {
        match self {
            Source::Local(engine) => match query {
                Query::Head { raw } => Ok(Answer::Header(engine.head(address, *raw)?)),
                Query::Range(range) => Ok(Answer::Bytes(engine.get_range(address, *range)?)),
                Query::Hash { range, kind } => {
                    let data = engine.get_range(address, *range)?;
                    Ok(Answer::Checksum(checksum_of(*kind, &data)))
                }
            },
            Source::Remote { client, node } => {
                let answer = match query {
                    Query::Head { raw } => Answer::Header(client.head(node, address, *raw, cancel).await?),
                    Query::Range(range) => Answer::Bytes(client.get_range(node, address, *range, cancel).await?),
                    Query::Hash { range, kind } => {
                        Answer::Checksum(client.range_hash(node, address, *range, *kind, cancel).await?)
                    }
                };
                Ok(answer)
            }
        }
    }

    pub async fn put(&self, object: &Object, cancel: &CancelToken) -> ServiceResult<()> {
        match self {
            Source::Local(engine) => {
                validate(object)?;
                engine.put(object)?;
                Ok(())
            }
            Source::Remote { client, node } => client.put(node, object, cancel).await,
        }
    }
}
