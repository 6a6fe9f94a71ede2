use std::io::{self, Read, Write};

use crate::error::{ProviderResultExt, Result};
use crate::provider::Identity;
use crate::structs::{SignatureTrailer, to_bytes};

/// Sign `digest` and append the signature, both certificates and `filler`
/// zero bytes to `sink`. Returns the number of bytes written.
///
/// The device certificate is fetched before signing, matching the order
/// the console's services expect.
pub fn write_signature_trailer<W, I>(
    sink: &mut W,
    identity: &I,
    digest: &[u8; 20],
    filler: usize,
) -> Result<u64>
where
    W: Write + ?Sized,
    I: Identity + ?Sized,
{
    let device_certificate = identity
        .device_certificate()
        .during("get_device_certificate")?;
    let signed = identity.sign(digest).during("sign")?;

    let trailer = SignatureTrailer {
        signature: signed.signature,
        device_certificate,
        ap_certificate: signed.ap_certificate,
    };
    sink.write_all(&to_bytes(&trailer)?)?;

    let padded = io::copy(&mut io::repeat(0).take(filler as u64), sink)?;
    Ok(SignatureTrailer::SIZE as u64 + padded)
}
