//! Parameter sets for statement binding.

use crate::value::Value;
use std::collections::HashMap;

/// One set of parameters for one execution of a statement.
///
/// Positional sets bind `?`/`?NNN` placeholders in order. Named sets bind
/// `:name`, `@name` and `$name` placeholders by key; keys are stored
/// without their prefix character.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(HashMap<String, Value>),
}

impl Params {
    /// Build a positional set from anything convertible to values.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Build a named set. A leading `:`, `@` or `$` on a key is ignored.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (strip_prefix(k.as_ref()).to_string(), v.into()))
                .collect(),
        )
    }

    /// Number of supplied values.
    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(values) => values.len(),
            Params::Named(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a named value by the placeholder text the engine reports.
    pub fn get_named(&self, placeholder: &str) -> Option<&Value> {
        match self {
            Params::Named(map) => map.get(strip_prefix(placeholder)),
            _ => None,
        }
    }
}

fn strip_prefix(name: &str) -> &str {
    name.strip_prefix([':', '@', '$']).unwrap_or(name)
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Params::Positional(values.into())
    }
}

impl From<HashMap<String, Value>> for Params {
    fn from(map: HashMap<String, Value>) -> Self {
        Params::named(map)
    }
}

macro_rules! tuple_params {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> From<($($name,)+)> for Params {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Params::Positional(vec![$($name.into()),+])
            }
        }
    };
}

tuple_params!(A);
tuple_params!(A, B);
tuple_params!(A, B, C);
tuple_params!(A, B, C, D);
tuple_params!(A, B, C, D, E);
tuple_params!(A, B, C, D, E, F);
tuple_params!(A, B, C, D, E, F, G);
tuple_params!(A, B, C, D, E, F, G, H);

/// Build a positional [`Params`](crate::Params) from expressions.
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::Positional(::std::vec::Vec::new())
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Params::Positional(::std::vec![$($crate::Value::from($value)),+])
    };
}

/// Build a named [`Params`](crate::Params) from `key => value` pairs.
#[macro_export]
macro_rules! named_params {
    ($($key:expr => $value:expr),* $(,)?) => {
        $crate::Params::named([$(($key, $crate::Value::from($value))),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuples_become_positional() {
        let p = Params::from((1, "x"));
        assert_eq!(
            p,
            Params::Positional(vec![Value::Integer(1), Value::Text("x".to_string())])
        );
        assert_eq!(p.len(), 2);
        assert!(Params::from(()).is_empty());
    }

    #[test]
    fn named_keys_drop_prefix() {
        let p = crate::named_params! { ":a" => 1, "b" => 2.5 };
        assert_eq!(p.get_named(":a"), Some(&Value::Integer(1)));
        assert_eq!(p.get_named("@b"), Some(&Value::Real(2.5)));
        assert_eq!(p.get_named("$c"), None);
    }

    #[test]
    fn params_macro() {
        let p = crate::params![1, "two", None::<i64>];
        assert_eq!(p.len(), 3);
        assert_eq!(crate::params![], Params::Positional(vec![]));
        assert_eq!(Params::None.get_named("a"), None);
    }
}
