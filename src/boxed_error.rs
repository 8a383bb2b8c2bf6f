
/// Define an error type wrapper e.g. `Foo` around a `Box<FooKind>`,
/// so that `Result<T, Foo>` stays one pointer wide however large
/// `FooKind` grows. Implements `std::error::Error`, `Display`,
/// `Debug`, `Deref<Target = FooKind>` and `From` (forwarding to
/// `FooKind`'s `From` impls, so `thiserror`'s `#[from]` still
/// works). `FooKind` has to be defined separately.
#[macro_export]
macro_rules! def_boxed_error {
    ($wrappername:ident, $kindname:ident) => {

        #[derive(Debug)]
        pub struct $wrappername(Box<$kindname>);

        impl $wrappername {
            pub fn kind(&self) -> &$kindname {
                &self.0
            }

            pub fn into_kind(self) -> $kindname {
                *self.0
            }
        }

        impl std::ops::Deref for $wrappername {
            type Target = $kindname;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<E> From<E> for $wrappername where $kindname: From<E> {
            fn from(err: E) -> Self {
                $wrappername(Box::new($kindname::from(err)))
            }
        }

        impl std::error::Error for $wrappername {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                self.0.source()
            }
        }

        impl std::fmt::Display for $wrappername {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // Don't use the fmt method call as it can be
                // ambiguous
                std::fmt::Display::fmt(&*self.0, f)
            }
        }
    }
}


/// Defines both an error kind (deriving `thiserror::Error`) and its
/// box wrapper as per `def_boxed_error`:
///
/// ```ignore
/// def_boxed_thiserror!(ParseError, pub enum ParseErrorKind {
///     #[error("missing {0}")]
///     Missing(String),
/// });
/// ```
#[macro_export]
macro_rules! def_boxed_thiserror {
    ($wrappername:ident, $key1:tt $kindname:ident {$($body:tt)*}) => {
        $crate::_def_boxed_thiserror!($wrappername, $kindname, $key1 $kindname {
            $($body)*
        });
    };
    ($wrappername:ident, $key1:tt $key2:tt $kindname:ident {$($body:tt)*}) => {
        $crate::_def_boxed_thiserror!($wrappername, $kindname, $key1 $key2 $kindname {
            $($body)*
        });
    };
}

#[macro_export]
macro_rules! _def_boxed_thiserror {
    (
        $wrappername:ident,
        $kindname:ident,
        $($innerdef:tt)*
    ) => {
        #[derive(thiserror::Error, Debug)]
        $($innerdef)*

        $crate::def_boxed_error!($wrappername, $kindname);
    }
}


#[cfg(test)]
mod tests {
    use std::error::Error;

    crate::def_boxed_thiserror!(DemoError, pub enum DemoErrorKind {
        #[error("bad count {0}")]
        BadCount(u32),
        #[error("reading the thing")]
        Io(#[from] std::io::Error),
    });

    fn fails(n: u32) -> Result<(), DemoError> {
        Err(DemoErrorKind::BadCount(n).into())
    }

    #[test]
    fn t_boxed() {
        assert_eq!(std::mem::size_of::<DemoError>(), std::mem::size_of::<usize>());
        let e = fails(3).unwrap_err();
        assert_eq!(e.to_string(), "bad count 3");
        assert!(matches!(*e, DemoErrorKind::BadCount(3)));
        assert!(e.source().is_none());

        let e: DemoError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(e.kind(), DemoErrorKind::Io(_)));
        assert_eq!(e.source().map(|s| s.to_string()), Some("disk".into()));
        assert!(matches!(e.into_kind(), DemoErrorKind::Io(_)));
    }
}
