use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, Connection};

use crate::catalog::{self, TrackInfo};
use crate::context::Context;
use crate::error::Result;
use crate::library::Library;

/// Free text search over artist names, album names and track titles.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub query: String,
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

impl SearchArgs {
    pub fn new<S: Into<String>>(query: S) -> SearchArgs {
        SearchArgs {
            query: query.into(),
            ..Default::default()
        }
    }
}

struct QueryOptions {
    clauses: Vec<String>,
    values: Vec<Box<dyn ToSql>>,
    order_string: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl QueryOptions {
    fn new() -> QueryOptions {
        QueryOptions {
            clauses: Vec::new(),
            values: Vec::new(),
            order_string: None,
            limit: None,
            offset: None,
        }
    }

    /// Adds `clause` with every `?` in it bound to `value`.
    fn filter_value<T>(&mut self, clause: &str, value: T)
    where
        T: ToSql + Clone + 'static,
    {
        for _ in clause.matches('?') {
            self.values.push(Box::new(value.clone()));
        }

        self.clauses.push(clause.to_string());
    }

    fn order_string(&mut self, order_string: &str) {
        self.order_string = Some(order_string.to_string());
    }

    fn limit(&mut self, limit: i64) {
        self.limit = Some(limit);
    }

    fn offset(&mut self, offset: i64) {
        self.offset = Some(offset);
    }

    fn into_sql(mut self, select_from: &str) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = select_from.to_string();

        if !self.clauses.is_empty() {
            sql += " WHERE ";
            sql += &self.clauses.join(" AND ");
        }

        if let Some(order) = self.order_string {
            sql += " ORDER BY ";
            sql += &order;
        }

        if self.limit.is_some() || self.offset.is_some() {
            sql += " LIMIT ?";
            self.values.push(Box::new(self.limit.unwrap_or(-1)));
        }

        if let Some(offset) = self.offset {
            sql += " OFFSET ?";
            self.values.push(Box::new(offset));
        }

        (sql, self.values)
    }

    fn query_tracks(self, conn: &Connection) -> Result<Vec<TrackInfo>> {
        let (sql, values) = self.into_sql(catalog::TRACK_INFO_SELECT);

        trace!("query '{}'", sql);

        let mut st = conn.prepare(&sql)?;

        let tracks = st
            .query_map(params_from_iter(values.iter()), catalog::_get_track_info)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tracks)
    }
}

/// Escapes LIKE wildcards so `text` only matches itself.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        if c == '\\' || c == '%' || c == '_' {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

pub fn search(conn: &Connection, args: &SearchArgs) -> Result<Vec<TrackInfo>> {
    let mut opts = QueryOptions::new();

    let pattern = format!("%{}%", escape_like(&args.query));

    opts.filter_value(
        "(artists.name LIKE ? ESCAPE '\\'
            OR albums.name LIKE ? ESCAPE '\\'
            OR tracks.name LIKE ? ESCAPE '\\')",
        pattern,
    );

    opts.order_string("artists.name, albums.name, tracks.number, tracks.id");

    if let Some(count) = args.count {
        opts.limit(count.max(0));
    }

    if let Some(offset) = args.offset {
        opts.offset(offset.max(0));
    }

    opts.query_tracks(conn)
}

impl Library {
    pub fn search(&self, ctx: &Context, args: &SearchArgs) -> Result<Vec<TrackInfo>> {
        ctx.check()?;

        debug!("search '{}'", args.query);

        self.catalog.with_conn(|conn| search(conn, args))
    }
}
