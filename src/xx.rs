//! Noise XX handshake: three authenticated messages plus two transport-phase
//! confirmation messages, over a blocking ordered transport.
//!
//! Message layout on the wire:
//!
//! - M1: 32-byte ephemeral key || payload
//! - M2: 32-byte ephemeral key || 48-byte encrypted static key || encrypted payload
//! - M3: 48-byte encrypted static key || encrypted payload
//! - M4/M5: raw AEAD ciphertext of a confirmation payload, no extra framing
//!
//! After message 3 both sides derive `(k1, k2) = KDF(ck, empty)`. `k1`
//! protects responder-to-initiator traffic, `k2` initiator-to-responder, each
//! with an independent counter starting at 0 and empty associated data.

use std::io::{Read, Write};

use rand_core::CryptoRngCore;
use tracing::{debug, trace};
use x25519_dalek::PublicKey;
use zeroize::Zeroizing;

use crate::cipher::{self, TAG_LEN};
use crate::dh::{KeyPair, DH_LEN};
use crate::errors::ChannelError;
use crate::kdf::KEY_LEN;
use crate::transcript::SymmetricState;

/// Width of an encrypted static key block: 32-byte key plus the GCM tag.
pub const SEALED_KEY_LEN: usize = DH_LEN + TAG_LEN;

/// Upper bound on a single framed handshake or transport message.
pub const MAX_FRAME_LEN: usize = 65_535;

/// Blocking, ordered, reliable message transport consumed by the handshake.
///
/// Each handshake step is a strict send/receive ping-pong; there is no
/// pipelining and no cancellation. Timeouts, if wanted, belong to the
/// implementation (e.g. a socket read timeout).
pub trait Transport {
    fn send(&mut self, data: &[u8]) -> Result<(), ChannelError>;
    fn recv(&mut self) -> Result<Vec<u8>, ChannelError>;
}

/// Length-prefix framing over any byte stream (Unix socket, TCP, pipe).
///
/// Frames are a 4-byte big-endian length followed by the message bytes.
pub struct FramedStream<S: Read + Write> {
    stream: S,
}

impl<S: Read + Write> FramedStream<S> {
    pub const fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for FramedStream<S> {
    fn send(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        if data.len() > MAX_FRAME_LEN {
            return Err(ChannelError::Oversized {
                len: data.len(),
                max: MAX_FRAME_LEN,
            });
        }
        let len = u32::try_from(data.len()).map_err(|_| ChannelError::Oversized {
            len: data.len(),
            max: MAX_FRAME_LEN,
        })?;
        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>, ChannelError> {
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes)?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ChannelError::Oversized {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// In-process duplex transport pair, for tests and examples.
pub struct Loopback {
    tx: std::sync::mpsc::Sender<Vec<u8>>,
    rx: std::sync::mpsc::Receiver<Vec<u8>>,
}

/// Create two connected in-memory transports.
#[must_use]
pub fn loopback_pair() -> (Loopback, Loopback) {
    let (a_tx, b_rx) = std::sync::mpsc::channel();
    let (b_tx, a_rx) = std::sync::mpsc::channel();
    (
        Loopback { tx: a_tx, rx: a_rx },
        Loopback { tx: b_tx, rx: b_rx },
    )
}

impl Transport for Loopback {
    fn send(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.tx
            .send(data.to_vec())
            .map_err(|_| ChannelError::Network(std::io::ErrorKind::BrokenPipe.into()))
    }

    fn recv(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.rx
            .recv()
            .map_err(|_| ChannelError::Network(std::io::ErrorKind::UnexpectedEof.into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitiatorStage {
    WriteM1,
    ReadM2,
    WriteM3,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponderStage {
    ReadM1,
    WriteM2,
    ReadM3,
    Done,
}

/// The initiating role of the XX pattern.
pub struct Initiator {
    stage: InitiatorStage,
    state: SymmetricState,
    s: KeyPair,
    e: KeyPair,
    re: Option<PublicKey>,
    rs: Option<PublicKey>,
}

impl Initiator {
    /// Fresh static and ephemeral keypairs from the injected entropy source.
    pub fn new(rng: &mut impl CryptoRngCore) -> Self {
        Self::from_keys(KeyPair::generate(rng), KeyPair::generate(rng))
    }

    /// Deterministic construction for test vectors.
    #[must_use]
    pub fn from_keys(static_keys: KeyPair, ephemeral_keys: KeyPair) -> Self {
        Self {
            stage: InitiatorStage::WriteM1,
            state: SymmetricState::new(),
            s: static_keys,
            e: ephemeral_keys,
            re: None,
            rs: None,
        }
    }

    /// M1: `-> e` — send the ephemeral key in the clear with a payload.
    pub fn write_message_1(&mut self, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if self.stage != InitiatorStage::WriteM1 {
            return Err(ChannelError::OutOfOrder);
        }
        self.state.mix_hash(self.e.public().as_bytes());
        self.state.mix_hash(payload);

        let mut message = self.e.public().as_bytes().to_vec();
        message.extend_from_slice(payload);
        self.stage = InitiatorStage::ReadM2;
        trace!(len = message.len(), "xx initiator sent m1");
        Ok(message)
    }

    /// M2: `<- e, ee, s, es` — learn the responder's keys, agree twice.
    pub fn read_message_2(&mut self, message: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if self.stage != InitiatorStage::ReadM2 {
            return Err(ChannelError::OutOfOrder);
        }
        let min = DH_LEN + SEALED_KEY_LEN + TAG_LEN;
        if message.len() < min {
            return Err(ChannelError::ShortRead {
                expected: min,
                got: message.len(),
            });
        }
        let mut re = [0u8; DH_LEN];
        re.copy_from_slice(&message[..DH_LEN]);
        let re = PublicKey::from(re);
        let sealed_rs = &message[DH_LEN..DH_LEN + SEALED_KEY_LEN];
        let sealed_payload = &message[DH_LEN + SEALED_KEY_LEN..];

        self.state.mix_hash(re.as_bytes());
        self.state
            .mix_key(Zeroizing::new(self.e.shared_secret(&re)).as_slice());
        let rs_bytes = self.state.decrypt_and_mix(sealed_rs)?;
        if rs_bytes.len() != DH_LEN {
            return Err(ChannelError::Protocol("static key of unexpected length"));
        }
        let mut rs = [0u8; DH_LEN];
        rs.copy_from_slice(&rs_bytes);
        let rs = PublicKey::from(rs);
        self.state
            .mix_key(Zeroizing::new(self.e.shared_secret(&rs)).as_slice());
        let payload = self.state.decrypt_and_mix(sealed_payload)?;

        self.re = Some(re);
        self.rs = Some(rs);
        self.stage = InitiatorStage::WriteM3;
        trace!("xx initiator processed m2");
        Ok(payload)
    }

    /// M3: `-> s, se` — send our static key under encryption, agree once more.
    pub fn write_message_3(&mut self, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if self.stage != InitiatorStage::WriteM3 {
            return Err(ChannelError::OutOfOrder);
        }
        let re = self.re.ok_or(ChannelError::OutOfOrder)?;
        let mut message = self.state.encrypt_and_mix(self.s.public().as_bytes())?;
        self.state
            .mix_key(Zeroizing::new(self.s.shared_secret(&re)).as_slice());
        let sealed_payload = self.state.encrypt_and_mix(payload)?;
        message.extend_from_slice(&sealed_payload);
        self.stage = InitiatorStage::Done;
        trace!(len = message.len(), "xx initiator sent m3");
        Ok(message)
    }

    /// Split off the transport keys. Consumes the handshake; the symmetric
    /// state is zeroized on drop and never reused.
    pub fn into_channel(self) -> Result<SecureChannel, ChannelError> {
        if self.stage != InitiatorStage::Done {
            return Err(ChannelError::OutOfOrder);
        }
        let rs = self.rs.ok_or(ChannelError::OutOfOrder)?;
        let (k1, k2) = self.state.split();
        // k2 protects initiator-to-responder, k1 the reverse direction.
        Ok(SecureChannel::new(k2, k1, *self.state.transcript_hash(), rs))
    }
}

/// The responding role of the XX pattern; the mirror image of [`Initiator`].
pub struct Responder {
    stage: ResponderStage,
    state: SymmetricState,
    s: KeyPair,
    e: KeyPair,
    re: Option<PublicKey>,
    rs: Option<PublicKey>,
}

impl Responder {
    pub fn new(rng: &mut impl CryptoRngCore) -> Self {
        Self::from_keys(KeyPair::generate(rng), KeyPair::generate(rng))
    }

    #[must_use]
    pub fn from_keys(static_keys: KeyPair, ephemeral_keys: KeyPair) -> Self {
        Self {
            stage: ResponderStage::ReadM1,
            state: SymmetricState::new(),
            s: static_keys,
            e: ephemeral_keys,
            re: None,
            rs: None,
        }
    }

    /// M1: `-> e` — learn the initiator's ephemeral key.
    pub fn read_message_1(&mut self, message: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if self.stage != ResponderStage::ReadM1 {
            return Err(ChannelError::OutOfOrder);
        }
        if message.len() < DH_LEN {
            return Err(ChannelError::ShortRead {
                expected: DH_LEN,
                got: message.len(),
            });
        }
        let mut re = [0u8; DH_LEN];
        re.copy_from_slice(&message[..DH_LEN]);
        self.re = Some(PublicKey::from(re));
        self.state.mix_hash(&re);
        self.state.mix_hash(&message[DH_LEN..]);
        self.stage = ResponderStage::WriteM2;
        trace!("xx responder processed m1");
        Ok(message[DH_LEN..].to_vec())
    }

    /// M2: `<- e, ee, s, es`.
    pub fn write_message_2(&mut self, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if self.stage != ResponderStage::WriteM2 {
            return Err(ChannelError::OutOfOrder);
        }
        let re = self.re.ok_or(ChannelError::OutOfOrder)?;
        self.state.mix_hash(self.e.public().as_bytes());
        self.state
            .mix_key(Zeroizing::new(self.e.shared_secret(&re)).as_slice());
        let sealed_s = self.state.encrypt_and_mix(self.s.public().as_bytes())?;
        self.state
            .mix_key(Zeroizing::new(self.s.shared_secret(&re)).as_slice());
        let sealed_payload = self.state.encrypt_and_mix(payload)?;

        let mut message = self.e.public().as_bytes().to_vec();
        message.extend_from_slice(&sealed_s);
        message.extend_from_slice(&sealed_payload);
        self.stage = ResponderStage::ReadM3;
        trace!(len = message.len(), "xx responder sent m2");
        Ok(message)
    }

    /// M3: `-> s, se`.
    pub fn read_message_3(&mut self, message: &[u8]) -> Result<Vec<u8>, ChannelError> {
        if self.stage != ResponderStage::ReadM3 {
            return Err(ChannelError::OutOfOrder);
        }
        let min = SEALED_KEY_LEN + TAG_LEN;
        if message.len() < min {
            return Err(ChannelError::ShortRead {
                expected: min,
                got: message.len(),
            });
        }
        let rs_bytes = self.state.decrypt_and_mix(&message[..SEALED_KEY_LEN])?;
        if rs_bytes.len() != DH_LEN {
            return Err(ChannelError::Protocol("static key of unexpected length"));
        }
        let mut rs = [0u8; DH_LEN];
        rs.copy_from_slice(&rs_bytes);
        let rs = PublicKey::from(rs);
        self.state
            .mix_key(Zeroizing::new(self.e.shared_secret(&rs)).as_slice());
        let payload = self.state.decrypt_and_mix(&message[SEALED_KEY_LEN..])?;
        self.rs = Some(rs);
        self.stage = ResponderStage::Done;
        trace!("xx responder processed m3");
        Ok(payload)
    }

    pub fn into_channel(self) -> Result<SecureChannel, ChannelError> {
        if self.stage != ResponderStage::Done {
            return Err(ChannelError::OutOfOrder);
        }
        let rs = self.rs.ok_or(ChannelError::OutOfOrder)?;
        let (k1, k2) = self.state.split();
        Ok(SecureChannel::new(k1, k2, *self.state.transcript_hash(), rs))
    }
}

/// An established, mutually-authenticated channel.
///
/// Send and receive directions use distinct keys and independent nonce
/// counters; associated data in the transport phase is empty.
pub struct SecureChannel {
    send_key: [u8; KEY_LEN],
    recv_key: [u8; KEY_LEN],
    send_nonce: u64,
    recv_nonce: u64,
    transcript: [u8; 32],
    remote_static: PublicKey,
}

impl SecureChannel {
    const fn new(
        send_key: [u8; KEY_LEN],
        recv_key: [u8; KEY_LEN],
        transcript: [u8; 32],
        remote_static: PublicKey,
    ) -> Self {
        Self {
            send_key,
            recv_key,
            send_nonce: 0,
            recv_nonce: 0,
            transcript,
            remote_static,
        }
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let ciphertext = cipher::encrypt(&self.send_key, self.send_nonce, &[], plaintext)?;
        self.send_nonce += 1;
        Ok(ciphertext)
    }

    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let plaintext = cipher::decrypt(&self.recv_key, self.recv_nonce, &[], ciphertext)?;
        self.recv_nonce += 1;
        Ok(plaintext)
    }

    /// The authenticated static key of the peer.
    #[must_use]
    pub const fn remote_static(&self) -> &PublicKey {
        &self.remote_static
    }

    /// Final transcript hash, identical on both ends; binds the channel to
    /// the full handshake exchange.
    #[must_use]
    pub const fn transcript_hash(&self) -> &[u8; 32] {
        &self.transcript
    }
}

impl Drop for SecureChannel {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.send_key.zeroize();
        self.recv_key.zeroize();
    }
}

/// Run the full initiator side over a transport: M1..M3, then receive the
/// responder's confirmation (M4) and answer with ours (M5).
///
/// Returns the live channel and the peer's decrypted confirmation payload.
pub fn initiate<T: Transport>(
    transport: &mut T,
    rng: &mut impl CryptoRngCore,
    confirmation: &[u8],
) -> Result<(SecureChannel, Vec<u8>), ChannelError> {
    let mut initiator = Initiator::new(rng);
    let m1 = initiator.write_message_1(&[])?;
    transport.send(&m1)?;
    let m2 = transport.recv()?;
    initiator.read_message_2(&m2)?;
    let m3 = initiator.write_message_3(&[])?;
    transport.send(&m3)?;

    let mut channel = initiator.into_channel()?;
    let m4 = transport.recv()?;
    let peer_confirmation = channel.open(&m4)?;
    let m5 = channel.seal(confirmation)?;
    transport.send(&m5)?;
    debug!("secure channel established (initiator)");
    Ok((channel, peer_confirmation))
}

/// Run the full responder side over a transport: M1..M3, then send our
/// confirmation (M4) and receive the initiator's (M5).
pub fn respond<T: Transport>(
    transport: &mut T,
    rng: &mut impl CryptoRngCore,
    confirmation: &[u8],
) -> Result<(SecureChannel, Vec<u8>), ChannelError> {
    let mut responder = Responder::new(rng);
    let m1 = transport.recv()?;
    responder.read_message_1(&m1)?;
    let m2 = responder.write_message_2(&[])?;
    transport.send(&m2)?;
    let m3 = transport.recv()?;
    responder.read_message_3(&m3)?;

    let mut channel = responder.into_channel()?;
    let m4 = channel.seal(confirmation)?;
    transport.send(&m4)?;
    let m5 = transport.recv()?;
    let peer_confirmation = channel.open(&m5)?;
    debug!("secure channel established (responder)");
    Ok((channel, peer_confirmation))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Initiator, Responder) {
        let initiator = Initiator::from_keys(
            KeyPair::from_secret_bytes([0x11; 32]),
            KeyPair::from_secret_bytes([0x22; 32]),
        );
        let responder = Responder::from_keys(
            KeyPair::from_secret_bytes([0x33; 32]),
            KeyPair::from_secret_bytes([0x44; 32]),
        );
        (initiator, responder)
    }

    #[test]
    fn out_of_order_steps_rejected() {
        let (mut initiator, mut responder) = pair();
        assert!(matches!(
            initiator.read_message_2(&[0u8; 96]),
            Err(ChannelError::OutOfOrder)
        ));
        assert!(matches!(
            responder.write_message_2(&[]),
            Err(ChannelError::OutOfOrder)
        ));
        assert!(matches!(
            responder.read_message_3(&[0u8; 64]),
            Err(ChannelError::OutOfOrder)
        ));
    }

    #[test]
    fn short_m2_is_short_read() {
        let (mut initiator, _) = pair();
        let _ = initiator.write_message_1(&[]).unwrap();
        assert!(matches!(
            initiator.read_message_2(&[0u8; 50]),
            Err(ChannelError::ShortRead { .. })
        ));
    }

    #[test]
    fn tampered_m3_fails_authentication() {
        let (mut initiator, mut responder) = pair();
        let m1 = initiator.write_message_1(&[]).unwrap();
        responder.read_message_1(&m1).unwrap();
        let m2 = responder.write_message_2(&[]).unwrap();
        initiator.read_message_2(&m2).unwrap();
        let mut m3 = initiator.write_message_3(&[]).unwrap();
        m3[0] ^= 1;
        assert!(matches!(
            responder.read_message_3(&m3),
            Err(ChannelError::Authentication)
        ));
    }

    #[test]
    fn channel_keys_and_directions_agree() {
        let (mut initiator, mut responder) = pair();
        let m1 = initiator.write_message_1(&[]).unwrap();
        responder.read_message_1(&m1).unwrap();
        let m2 = responder.write_message_2(&[]).unwrap();
        initiator.read_message_2(&m2).unwrap();
        let m3 = initiator.write_message_3(&[]).unwrap();
        responder.read_message_3(&m3).unwrap();

        let mut alice = initiator.into_channel().unwrap();
        let mut bob = responder.into_channel().unwrap();
        assert_eq!(alice.transcript_hash(), bob.transcript_hash());

        let ct = bob.seal(b"yellowsubmarine").unwrap();
        assert_eq!(alice.open(&ct).unwrap(), b"yellowsubmarine");
        let ct = alice.seal(b"hello bob").unwrap();
        assert_eq!(bob.open(&ct).unwrap(), b"hello bob");
    }

    #[test]
    fn framed_stream_round_trip() {
        let buf: Vec<u8> = Vec::new();
        let mut framed = FramedStream::new(std::io::Cursor::new(buf));
        framed.send(b"abc").unwrap();
        let mut cursor = framed.into_inner();
        cursor.set_position(0);
        let mut framed = FramedStream::new(cursor);
        assert_eq!(framed.recv().unwrap(), b"abc");
    }
}
