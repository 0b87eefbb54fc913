use std::{
    io::{Error, ErrorKind, Result, Write},
    iter,
};

use alloy::primitives::{keccak256, Address, Bytes, B256};
use byteorder::{BigEndian, WriteBytesExt};
use serde::Serialize;

use crate::constants::QUERY_VERSION;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u16)]
pub enum SubqueryType {
    Header = 1,
    Account = 2,
    Transaction = 4,
    Receipt = 5,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderSubquery {
    pub block_number: u32,
    pub field_idx: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSubquery {
    pub block_number: u32,
    pub addr: Address,
    pub field_idx: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxSubquery {
    pub block_number: u32,
    pub tx_idx: u16,
    pub field_or_calldata_idx: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptSubquery {
    pub block_number: u32,
    pub tx_idx: u16,
    pub field_or_log_idx: u32,
    pub topic_or_data_or_address_idx: u32,
    pub event_schema: B256,
}

/// A declaration with every target resolved to a block position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subquery {
    Header(HeaderSubquery),
    Account(AccountSubquery),
    Transaction(TxSubquery),
    Receipt(ReceiptSubquery),
}

impl Subquery {
    pub fn subquery_type(&self) -> SubqueryType {
        match self {
            Subquery::Header(_) => SubqueryType::Header,
            Subquery::Account(_) => SubqueryType::Account,
            Subquery::Transaction(_) => SubqueryType::Transaction,
            Subquery::Receipt(_) => SubqueryType::Receipt,
        }
    }

    /// `uint16` type followed by the type specific data.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_u16::<BigEndian>(self.subquery_type() as u16)?;
        match self {
            Subquery::Header(subquery) => encode_header_subquery(writer, subquery),
            Subquery::Account(subquery) => encode_account_subquery(writer, subquery),
            Subquery::Transaction(subquery) => encode_tx_subquery(writer, subquery),
            Subquery::Receipt(subquery) => encode_receipt_subquery(writer, subquery),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut encoded = vec![];
        self.write(&mut encoded)?;
        Ok(encoded)
    }

    pub fn keccak(&self) -> Result<B256> {
        Ok(keccak256(self.encode()?))
    }
}

pub fn encode_header_subquery(writer: &mut impl Write, subquery: &HeaderSubquery) -> Result<()> {
    let HeaderSubquery { block_number, field_idx } = subquery;
    writer.write_u32::<BigEndian>(*block_number)?;
    writer.write_u32::<BigEndian>(*field_idx)?;
    Ok(())
}

pub fn encode_account_subquery(writer: &mut impl Write, subquery: &AccountSubquery) -> Result<()> {
    let AccountSubquery { block_number, addr, field_idx } = subquery;
    writer.write_u32::<BigEndian>(*block_number)?;
    writer.write_all(addr.as_slice())?;
    writer.write_u32::<BigEndian>(*field_idx)?;
    Ok(())
}

pub fn encode_tx_subquery(writer: &mut impl Write, subquery: &TxSubquery) -> Result<()> {
    let TxSubquery { block_number, tx_idx, field_or_calldata_idx } = subquery;
    writer.write_u32::<BigEndian>(*block_number)?;
    writer.write_u16::<BigEndian>(*tx_idx)?;
    writer.write_u32::<BigEndian>(*field_or_calldata_idx)?;
    Ok(())
}

pub fn encode_receipt_subquery(writer: &mut impl Write, subquery: &ReceiptSubquery) -> Result<()> {
    let ReceiptSubquery {
        block_number,
        tx_idx,
        field_or_log_idx,
        topic_or_data_or_address_idx,
        event_schema,
    } = subquery;
    writer.write_u32::<BigEndian>(*block_number)?;
    writer.write_u16::<BigEndian>(*tx_idx)?;
    writer.write_u32::<BigEndian>(*field_or_log_idx)?;
    writer.write_u32::<BigEndian>(*topic_or_data_or_address_idx)?;
    writer.write_all(event_schema.as_slice())?;
    Ok(())
}

/// `uint64 sourceChainId ‖ uint16 numSubqueries ‖ subqueries`.
pub fn encode_data_query(source_chain_id: u64, subqueries: &[Subquery]) -> Result<Bytes> {
    let num_subqueries: u16 = subqueries
        .len()
        .try_into()
        .map_err(|_| Error::new(ErrorKind::InvalidInput, "too many subqueries"))?;
    let mut encoded = vec![];
    encoded.write_u64::<BigEndian>(source_chain_id)?;
    encoded.write_u16::<BigEndian>(num_subqueries)?;
    for subquery in subqueries {
        subquery.write(&mut encoded)?;
    }
    Ok(encoded.into())
}

pub fn get_data_query_hash(source_chain_id: u64, subqueries: &[Subquery]) -> Result<B256> {
    let subquery_hashes = subqueries.iter().map(Subquery::keccak).collect::<Result<Vec<_>>>()?;
    let encoded: Vec<u8> = iter::empty()
        .chain(source_chain_id.to_be_bytes())
        .chain(subquery_hashes.iter().flat_map(|hash| hash.0))
        .collect();
    Ok(keccak256(encoded))
}

/// Computation run over the fetched results before the callback.
/// `k == 0` means there is none and the results are passed through.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeQuery {
    pub k: u8,
    pub result_len: u16,
    pub vkey: Vec<B256>,
    pub compute_proof: Bytes,
}

impl ComputeQuery {
    pub fn passthrough(result_len: u16) -> Self {
        Self { result_len, ..Default::default() }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.k != 0 {
            let message = "only empty compute queries are supported";
            return Err(Error::new(ErrorKind::Unsupported, message));
        }
        Ok([&[0u8], &self.result_len.to_be_bytes()[..]].concat())
    }
}

pub fn get_query_hash(
    source_chain_id: u64,
    data_query_hash: B256,
    compute_query: &ComputeQuery,
) -> Result<B256> {
    let mut encoded = vec![];
    encoded.write_u8(QUERY_VERSION)?;
    encoded.write_u64::<BigEndian>(source_chain_id)?;
    encoded.write_all(data_query_hash.as_slice())?;
    encoded.write_all(&compute_query.encode()?)?;
    Ok(keccak256(encoded))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::b256;

    use super::*;

    fn receipt_subquery(log_idx: u32) -> Subquery {
        Subquery::Receipt(ReceiptSubquery {
            block_number: 100,
            tx_idx: 7,
            field_or_log_idx: 100 + log_idx,
            topic_or_data_or_address_idx: 2,
            event_schema: b256!("d78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822"),
        })
    }

    fn header_subquery() -> Subquery {
        Subquery::Header(HeaderSubquery { block_number: 42, field_idx: 8 })
    }

    #[test]
    fn receipt_subquery_layout() {
        let encoded = receipt_subquery(3).encode().unwrap();

        assert_eq!(encoded.len(), 2 + 4 + 2 + 4 + 4 + 32);
        assert_eq!(&encoded[..2], &[0, 5]);
        assert_eq!(&encoded[2..6], &100u32.to_be_bytes());
        assert_eq!(&encoded[6..8], &7u16.to_be_bytes());
        assert_eq!(&encoded[8..12], &103u32.to_be_bytes());
    }

    #[test]
    fn data_query_prefix() {
        let subqueries = vec![receipt_subquery(3), header_subquery()];
        let encoded = encode_data_query(5, &subqueries).unwrap();

        assert_eq!(&encoded[..8], &5u64.to_be_bytes());
        assert_eq!(&encoded[8..10], &2u16.to_be_bytes());
        assert_eq!(encoded.len(), 10 + 48 + 10);
    }

    #[test]
    fn data_query_hash_is_order_sensitive() {
        let forward = get_data_query_hash(5, &[receipt_subquery(3), header_subquery()]).unwrap();
        let reversed = get_data_query_hash(5, &[header_subquery(), receipt_subquery(3)]).unwrap();
        let again = get_data_query_hash(5, &[receipt_subquery(3), header_subquery()]).unwrap();

        assert_ne!(forward, reversed);
        assert_eq!(forward, again);
    }

    #[test]
    fn data_query_hash_depends_on_chain() {
        let subqueries = [header_subquery()];
        assert_ne!(
            get_data_query_hash(1, &subqueries).unwrap(),
            get_data_query_hash(5, &subqueries).unwrap()
        );
    }

    #[test]
    fn passthrough_compute_query_encoding() {
        let compute_query = ComputeQuery::passthrough(4);
        assert_eq!(compute_query.encode().unwrap(), vec![0, 0, 4]);

        let with_circuit = ComputeQuery { k: 14, ..compute_query };
        assert!(with_circuit.encode().is_err());
    }

    #[test]
    fn query_hash_binds_compute_query() {
        let data_query_hash = get_data_query_hash(5, &[header_subquery()]).unwrap();
        let one = get_query_hash(5, data_query_hash, &ComputeQuery::passthrough(1)).unwrap();
        let two = get_query_hash(5, data_query_hash, &ComputeQuery::passthrough(2)).unwrap();

        assert_ne!(one, two);
        assert_eq!(one, get_query_hash(5, data_query_hash, &ComputeQuery::passthrough(1)).unwrap());
    }
}
