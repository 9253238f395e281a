use crate::record::{RecordDecodeError, RecordHeader};

/// Split a datagram into the records it carries
///
/// Returns each record, header included, as a borrowed span of `datagram`, in wire order. With
/// `cid_len` set, `tls12_cid` records are read with a connection ID field of that length;
/// otherwise every header is read at its fixed width.
///
/// The datagram must be consumed exactly: an empty datagram, a header cut short, or a length
/// running past the end rejects the whole datagram, including the records that did parse.
pub fn unpack_datagram(
    datagram: &[u8],
    cid_len: Option<usize>,
) -> Result<Vec<&[u8]>, RecordDecodeError> {
    if datagram.is_empty() {
        return Err(RecordDecodeError::EmptyDatagram);
    }

    let mut out = Vec::new();
    let mut offset = 0;
    while offset != datagram.len() {
        let mut rest = &datagram[offset..];
        let header = RecordHeader::decode(&mut rest, cid_len)?;
        let record_len = header.record_len();
        if record_len > datagram.len() - offset {
            return Err(RecordDecodeError::InvalidHeader("record length exceeds datagram"));
        }
        out.push(&datagram[offset..offset + record_len]);
        offset += record_len;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use hex_literal::hex;

    use super::*;
    use crate::{
        record::{ContentType, ProtocolVersion},
        shared::ConnectionId,
        MAX_CID_SIZE,
    };

    fn record(content_type: ContentType, cid: Option<&[u8]>, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        RecordHeader {
            content_type,
            version: ProtocolVersion::DTLS1_2,
            epoch: 1,
            sequence_number: 42,
            connection_id: cid.map(ConnectionId::new),
            content_len: payload.len() as u16,
        }
        .encode(&mut buf);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn empty_datagram() {
        assert_eq!(unpack_datagram(&[], None), Err(RecordDecodeError::EmptyDatagram));
        assert_eq!(unpack_datagram(&[], Some(8)), Err(RecordDecodeError::EmptyDatagram));
    }

    #[test]
    fn splits_in_order() {
        for n in [1, 2, 5] {
            let records = (0..n)
                .map(|i| record(ContentType::APPLICATION_DATA, None, &vec![i as u8; i * 3]))
                .collect::<Vec<_>>();
            let datagram = records.concat();
            let spans = unpack_datagram(&datagram, None).unwrap();
            assert_eq!(spans.len(), n);
            let mut offset = 0;
            for (span, expected) in spans.iter().zip(&records) {
                assert_eq!(*span, &expected[..]);
                // Spans borrow the datagram itself
                assert_eq!(span.as_ptr(), datagram[offset..].as_ptr());
                offset += span.len();
            }
        }
    }

    #[test]
    fn truncated_tail_rejected() {
        for n in [1, 2, 5] {
            let mut datagram = (0..n)
                .map(|_| record(ContentType::HANDSHAKE, None, b"hello"))
                .collect::<Vec<_>>()
                .concat();
            datagram.pop();
            assert_matches!(
                unpack_datagram(&datagram, None),
                Err(RecordDecodeError::InvalidHeader(_))
            );
        }
    }

    #[test]
    fn header_only_fragment_rejected() {
        let mut datagram = record(ContentType::HANDSHAKE, None, b"hello");
        datagram.extend_from_slice(&hex!("16 fefd"));
        assert_matches!(
            unpack_datagram(&datagram, None),
            Err(RecordDecodeError::InvalidHeader(_))
        );
    }

    #[test]
    fn cid_aware_mixed() {
        let cid = hex!("0102030405060708");
        let records = [
            record(ContentType::CONNECTION_ID, Some(&cid), b"encrypted"),
            record(ContentType::ALERT, None, &[2, 10]),
            record(ContentType::CONNECTION_ID, Some(&cid), b""),
        ];
        let datagram = records.concat();
        let spans = unpack_datagram(&datagram, Some(cid.len())).unwrap();
        assert_eq!(spans, records.iter().map(|r| &r[..]).collect::<Vec<_>>());
    }

    #[test]
    fn cid_records_misread_without_length() {
        // A tls12_cid record read at fixed width takes CID bytes for the length field
        let datagram = record(
            ContentType::CONNECTION_ID,
            Some(&hex!("ffff ffff")),
            b"data",
        );
        assert!(unpack_datagram(&datagram, None).is_err());
        assert_eq!(unpack_datagram(&datagram, Some(4)).unwrap().len(), 1);
    }

    #[test]
    fn oversized_cid_length_rejected() {
        let mut datagram = record(ContentType::CONNECTION_ID, Some(&[] as &[u8]), b"");
        datagram.extend_from_slice(&[0; 300]);
        assert_eq!(
            unpack_datagram(&datagram, Some(MAX_CID_SIZE + 1)),
            Err(RecordDecodeError::InvalidHeader("connection ID too long"))
        );
    }

    #[test]
    fn zero_length_cid() {
        let datagram = record(ContentType::CONNECTION_ID, Some(&[] as &[u8]), b"x");
        let spans = unpack_datagram(&datagram, Some(0)).unwrap();
        assert_eq!(spans, vec![&datagram[..]]);
    }
}
