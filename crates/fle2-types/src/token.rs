//! Nominally typed tokens.
//!
//! Every position in the derivation hierarchy is its own type: a
//! [`Token`] parameterized by a zero-sized kind marker. Passing an
//! `EscTwiceDerivedTagToken` where an `EccTwiceDerivedTagToken` is expected is
//! a compile error even though both wrap the same 32 bytes.

use std::fmt;
use std::marker::PhantomData;

use crate::PrfBlock;

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for token kinds.
pub trait TokenKind: sealed::Sealed {
    /// Human-readable type name, used by `Debug`.
    const NAME: &'static str;
}

/// A 32-byte token of kind `K`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token<K: TokenKind> {
    data: PrfBlock,
    kind: PhantomData<fn() -> K>,
}

impl<K: TokenKind> Token<K> {
    /// Wrap raw bytes as a token of this kind.
    #[must_use]
    pub const fn from_bytes(data: PrfBlock) -> Self {
        Self {
            data,
            kind: PhantomData,
        }
    }

    /// Borrow the raw token bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &PrfBlock {
        &self.data
    }

    /// Consume the token, returning its bytes.
    #[must_use]
    pub const fn into_bytes(self) -> PrfBlock {
        self.data
    }
}

impl<K: TokenKind> fmt::Debug for Token<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(<redacted>)", K::NAME)
    }
}

macro_rules! token_kinds {
    ($($(#[$doc:meta])* $kind:ident => $alias:ident;)*) => {
        /// Zero-sized kind markers, one per hierarchy position.
        pub mod kind {
            $(
                #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
                pub enum $kind {}

                impl super::sealed::Sealed for $kind {}

                impl super::TokenKind for $kind {
                    const NAME: &'static str = stringify!($alias);
                }
            )*
        }

        $(
            $(#[$doc])*
            pub type $alias = Token<kind::$kind>;
        )*
    };
}

token_kinds! {
    /// `PRF(IndexKey, 1)`.
    CollectionsLevel1 => CollectionsLevel1Token;
    /// `PRF(IndexKey, 2)`.
    ClientUserDataEncryptionLevel1 => ClientUserDataEncryptionLevel1Token;
    /// `PRF(IndexKey, 3)`.
    ServerDataEncryptionLevel1 => ServerDataEncryptionLevel1Token;

    /// `PRF(CollectionsLevel1, 1)`.
    Edc => EdcToken;
    /// `PRF(CollectionsLevel1, 2)`.
    Esc => EscToken;
    /// `PRF(CollectionsLevel1, 3)`.
    Ecc => EccToken;
    /// `PRF(CollectionsLevel1, 4)`.
    Ecoc => EcocToken;

    /// `PRF(EdcToken, value)`.
    EdcDerivedFromData => EdcDerivedFromDataToken;
    /// `PRF(EscToken, value)`.
    EscDerivedFromData => EscDerivedFromDataToken;
    /// `PRF(EccToken, value)`.
    EccDerivedFromData => EccDerivedFromDataToken;

    /// `PRF(EdcDerivedFromData, cf)`.
    EdcDerivedFromDataAndContentionFactor => EdcDerivedFromDataTokenAndContentionFactorToken;
    /// `PRF(EscDerivedFromData, cf)`.
    EscDerivedFromDataAndContentionFactor => EscDerivedFromDataTokenAndContentionFactorToken;
    /// `PRF(EccDerivedFromData, cf)`.
    EccDerivedFromDataAndContentionFactor => EccDerivedFromDataTokenAndContentionFactorToken;

    /// `PRF(EdcDerivedFromDataAndContentionFactor, 1)`; keys the EDC tags.
    EdcTwiceDerived => EdcTwiceDerivedToken;
    /// `PRF(EscDerivedFromDataAndContentionFactor, 1)`; keys ESC record ids.
    EscTwiceDerivedTag => EscTwiceDerivedTagToken;
    /// `PRF(EscDerivedFromDataAndContentionFactor, 2)`; encrypts ESC payloads.
    EscTwiceDerivedValue => EscTwiceDerivedValueToken;
    /// `PRF(EccDerivedFromDataAndContentionFactor, 1)`; keys ECC record ids.
    EccTwiceDerivedTag => EccTwiceDerivedTagToken;
    /// `PRF(EccDerivedFromDataAndContentionFactor, 2)`; encrypts ECC payloads.
    EccTwiceDerivedValue => EccTwiceDerivedValueToken;
}
