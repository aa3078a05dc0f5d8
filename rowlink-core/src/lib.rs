pub mod compiled;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod filter;
pub mod mutation;
pub mod operator;
pub mod order;
pub mod pagination;
pub mod query;
pub mod relation;
pub mod select;
pub mod value;

pub use compiled::{CompiledQuery, Method, ResponseMode};
pub use envelope::Envelope;
pub use error::{AuthErrorSource, Error, ErrorKind, ServerError, TransportErrorKind};
pub use executor::{CachePolicy, ExecOptions, Executor};
pub use filter::{FilterNode, Filterable, Leaf};
pub use mutation::{MutationBuilder, WriteKind};
pub use operator::{encode, Operator, TextSearch, WireToken};
pub use order::{Direction, Nulls, OrderSpec};
pub use pagination::{Page, PaginationSpec};
pub use query::{CountStrategy, QueryBuilder, QuerySpec};
pub use relation::{JoinHint, RelationSpec};
pub use select::SelectItem;
pub use value::{FilterValue, Scalar};

pub mod prelude {
    //! Re-exports of the most commonly used query types.
    pub use crate::filter::{self, Filterable};
    pub use crate::{
        CountStrategy, Direction, Envelope, Error, ErrorKind, FilterNode, OrderSpec, Page,
        QueryBuilder, RelationSpec, TextSearch,
    };
}
