#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::bip158::{BlockFilter, Error as BfError, FilterHeader};
use bitcoin::{
    block::{Header as BlockHeader, Version as BlockVersion},
    hash_types::TxMerkleNode,
    hashes::Hash,
    Amount, Block, BlockHash, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, WPubkeyHash,
    Witness,
};
use niebla_cfstate::filters::{filter_hash, genesis_filter};
use niebla_cfstate::prelude::*;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

/// A mined unit-test chain with real BIP-158 filters for every block.
pub struct StubChain {
    pub hashes: Vec<BlockHash>,
    pub headers: Vec<[u8; 80]>,
    pub filters: Vec<BlockFilter>,
}

impl StubChain {
    /// Genesis plus one block per entry of `outputs`, each paying to those scripts.
    pub fn new(outputs: Vec<Vec<ScriptBuf>>) -> Arc<Self> {
        let genesis = Header::genesis(&NativeHasher, Chain::UnitTest).unwrap();
        let mut hashes = vec![genesis.hash()];
        let mut headers = vec![genesis.encode()];
        let mut filters = vec![genesis_filter(Chain::UnitTest, FilterType::Basic).unwrap().filter];

        let mut parent = genesis;
        for (i, scripts) in outputs.into_iter().enumerate() {
            let height = i as u64 + 1;
            let header = HeaderBuilder::new(
                Chain::UnitTest,
                TxMerkleNode::from_byte_array([height as u8; 32]),
                parent.hash(),
                -1,
            )
            .timestamp(1_296_688_602 + height * 600)
            .mine(&NativeHasher)
            .unwrap()
            .attach_to(&parent)
            .unwrap();

            let block = block_for(&header, scripts);
            assert_eq!(block.block_hash(), header.hash());
            let filter = BlockFilter::new_script_filter(&block, |_op: &OutPoint| -> Result<ScriptBuf, BfError> {
                Ok(ScriptBuf::new())
            })
            .unwrap();

            hashes.push(header.hash());
            headers.push(header.encode());
            filters.push(filter);
            parent = header;
        }
        Arc::new(Self { hashes, headers, filters })
    }

    /// `n` blocks, each paying to its own script.
    pub fn with_blocks(n: u8) -> Arc<Self> {
        Self::new((1..=n).map(|i| vec![script(i)]).collect())
    }

    pub fn tip(&self) -> u32 {
        (self.hashes.len() - 1) as u32
    }

    pub fn filter_header_at(&self, height: u32) -> FilterHeader {
        self.filters[..=height as usize]
            .iter()
            .fold(FilterHeader::all_zeros(), |prev, f| f.filter_header(&prev))
    }

    fn height_of(&self, hash: &BlockHash) -> anyhow::Result<usize> {
        self.hashes
            .iter()
            .position(|h| h == hash)
            .ok_or_else(|| anyhow::anyhow!("unknown block {hash}"))
    }
}

pub fn script(n: u8) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([n; 20]))
}

fn block_for(header: &Header, scripts: Vec<ScriptBuf>) -> Block {
    let coinbase = Transaction {
        version: bitcoin::transaction::Version::TWO,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: scripts
            .into_iter()
            .map(|script_pubkey| TxOut {
                value: Amount::from_sat(50_000),
                script_pubkey,
            })
            .collect(),
    };
    Block {
        header: BlockHeader {
            version: BlockVersion::from_consensus(header.block_version()),
            prev_blockhash: header.parent_hash(),
            merkle_root: header.merkle_root(),
            time: header.timestamp() as u32,
            bits: header.bits(),
            nonce: header.nonce(),
        },
        txdata: vec![coinbase],
    }
}

/// Header source over a [`StubChain`], capped at `limit`.
pub struct StubHeaders {
    pub chain: Arc<StubChain>,
    pub limit: u32,
    /// Serve the header of the next block at this height.
    pub skip_at: Option<u32>,
}

impl StubHeaders {
    pub fn new(chain: &Arc<StubChain>) -> Self {
        Self {
            chain: Arc::clone(chain),
            limit: chain.tip(),
            skip_at: None,
        }
    }
}

#[async_trait]
impl HeaderSource for StubHeaders {
    async fn tip_height(&self) -> anyhow::Result<u32> {
        Ok(self.limit.min(self.chain.tip()))
    }

    async fn header_at_height(&self, h: u32) -> anyhow::Result<Vec<u8>> {
        let served = if self.skip_at == Some(h) { h + 1 } else { h };
        self.chain
            .headers
            .get(served as usize)
            .map(|raw| raw.to_vec())
            .ok_or_else(|| anyhow::anyhow!("out of range"))
    }
}

/// Filter source over a [`StubChain`], optionally misbehaving.
pub struct StubSource {
    pub chain: Arc<StubChain>,
    /// Serve a bogus filter for the block at this height.
    pub bad_filter_at: Option<u32>,
    /// Claim a wrong previous filter header.
    pub wrong_previous: bool,
    /// Number of `get_cfheaders` calls.
    pub requests: Arc<AtomicU32>,
}

impl StubSource {
    pub fn new(chain: &Arc<StubChain>) -> Self {
        Self {
            chain: Arc::clone(chain),
            bad_filter_at: None,
            wrong_previous: false,
            requests: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl FilterSource for StubSource {
    async fn get_cfheaders(
        &self,
        _filter_type: FilterType,
        start_h: u32,
        stop_hash: BlockHash,
    ) -> anyhow::Result<CfHeadersBatch> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let stop = self.chain.height_of(&stop_hash)?;
        let previous_header = if self.wrong_previous {
            FilterHeader::from_byte_array([0xee; 32])
        } else {
            self.chain.filter_header_at(start_h - 1)
        };
        Ok(CfHeadersBatch {
            start_height: start_h,
            previous_header,
            filter_hashes: self.chain.filters[start_h as usize..=stop]
                .iter()
                .map(filter_hash)
                .collect(),
        })
    }

    async fn get_cfilter(&self, _filter_type: FilterType, block: BlockHash) -> anyhow::Result<Vec<u8>> {
        let height = self.chain.height_of(&block)?;
        if self.bad_filter_at == Some(height as u32) {
            return Ok(vec![0x01, 0xde, 0xad]);
        }
        Ok(self.chain.filters[height].content.clone())
    }
}
