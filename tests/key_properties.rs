use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use proptest::prelude::*;

use peerwire::key::{decode_key, encode_key};
use peerwire::{Endpoint, Error, Peer, SecretKey};

proptest! {
    #[test]
    fn text_encoding_roundtrip(bytes in any::<[u8; 32]>()) {
        let decoded = decode_key(&encode_key(&bytes)).unwrap();
        prop_assert_eq!(decoded.as_bytes(), &bytes);
    }

    #[test]
    fn short_keys_are_rejected(bytes in prop::collection::vec(any::<u8>(), 0..32)) {
        let mut peer = Peer::new("p", Endpoint::default());
        peer.public_key = STANDARD.encode(&bytes);
        prop_assert!(matches!(peer.public_key(), Err(Error::Decode(_))));
    }

    #[test]
    fn public_key_last_write_wins(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
        let mut peer = Peer::new("p", Endpoint::default());
        peer.set_public_key(&SecretKey::from_bytes(a));
        peer.set_public_key(&SecretKey::from_bytes(b));
        prop_assert_eq!(peer.public_key().unwrap(), SecretKey::from_bytes(b));
    }
}
