//! Genesis filters derived from the bundled chain parameters.
use bitcoin::bip158::{self, BlockFilter, FilterHeader};
use bitcoin::hashes::Hash;
use bitcoin::{
    absolute::LockTime, block, transaction::Version, Amount, Block, BlockHash, OutPoint, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Witness,
};

use crate::chain::{Chain, FilterType};
use crate::error::StartupError;
use crate::header::genesis_fields;

const GENESIS_REWARD_SATS: u64 = 50 * 100_000_000;

/// Genesis filter and its filter header for one chain and filter type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisFilter {
    /// Genesis block hash.
    pub block_hash: BlockHash,
    /// Filter over the genesis block.
    pub filter: BlockFilter,
    /// Filter header, chained onto the all-zero header.
    pub header: FilterHeader,
}

/// Build the genesis filter of `chain`.
///
/// Only the coinbase output script feeds the filter; the genesis coinbase has
/// no spendable prevout and its script signature is not indexed.
pub fn genesis_filter(chain: Chain, filter_type: FilterType) -> Result<GenesisFilter, StartupError> {
    let fail = |reason: String| StartupError::Genesis { chain, filter_type, reason };

    let params = chain.params().genesis.ok_or_else(|| fail("no genesis parameters".into()))?;
    let (block_hash, fields) =
        genesis_fields(&params).ok_or_else(|| fail("malformed genesis parameters".into()))?;
    let script = hex::decode(params.output_script)
        .map_err(|e| fail(format!("genesis output script: {e}")))?;

    let block = Block {
        header: block::Header {
            version: block::Version::from_consensus(fields.block_version),
            prev_blockhash: fields.parent,
            merkle_root: fields.merkle_root,
            time: params.time,
            bits: fields.bits,
            nonce: fields.nonce,
        },
        txdata: vec![Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(GENESIS_REWARD_SATS),
                script_pubkey: ScriptBuf::from_bytes(script),
            }],
        }],
    };
    if block.block_hash() != block_hash {
        return Err(fail(format!(
            "genesis fields hash to {}, expected {block_hash}",
            block.block_hash()
        )));
    }

    let filter = match filter_type {
        FilterType::Basic => BlockFilter::new_script_filter(&block, |outpoint: &OutPoint| {
            Err::<ScriptBuf, _>(bip158::Error::UtxoMissing(*outpoint))
        })
        .map_err(|e| fail(format!("basic filter: {e}")))?,
    };
    let header = filter.filter_header(&FilterHeader::all_zeros());
    Ok(GenesisFilter { block_hash, filter, header })
}
