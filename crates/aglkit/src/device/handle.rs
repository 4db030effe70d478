use std::fmt;
use std::num::NonZeroU32;

macro_rules! object_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Wraps a raw driver name. `0` is the null name and yields `None`.
            #[inline]
            pub const fn new(raw: u32) -> Option<Self> {
                match NonZeroU32::new(raw) {
                    Some(n) => Some(Self(n)),
                    None => None,
                }
            }

            #[inline]
            pub(crate) const fn from_nonzero(raw: NonZeroU32) -> Self {
                Self(raw)
            }

            /// Raw driver name (never zero).
            #[inline]
            pub const fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

object_handle!(
    /// Name of a vertex buffer object.
    BufferHandle
);
object_handle!(
    /// Name of a texture object.
    TextureHandle
);
object_handle!(
    /// Name of a framebuffer object.
    FramebufferHandle
);
object_handle!(
    /// Name of a renderbuffer object.
    RenderbufferHandle
);
object_handle!(
    /// Name of a linked shader program.
    ProgramHandle
);
