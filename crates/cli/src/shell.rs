use anyhow::{anyhow, bail, Context, Result};
use config::EngineConfig;
use engine::{stale_shadows, ReadCache, Session, ShardSession};
use slot::{AccessMode, StoreError};
use std::str::FromStr;
use store::{FileData, PostingsBudget, PostingsList};
use tracing::warn;

/// What the REPL should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue(Vec<String>),
    Exit,
}

/// Shell state: at most one base session and one shard session at a time.
pub struct Shell {
    config: EngineConfig,
    session: Option<Session>,
    shard: Option<ShardSession>,
    cache: ReadCache,
}

impl Shell {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            session: None,
            shard: None,
            cache: ReadCache::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one command line. Blank lines produce no output.
    pub fn execute(&mut self, line: &str) -> Result<Flow> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(Flow::Continue(Vec::new()));
        };
        let args: Vec<&str> = parts.collect();

        let out = match cmd.to_uppercase().as_str() {
            "BEGIN" => self.begin(&args)?,
            "COMMIT" => self.commit()?,
            "ABORT" => self.abort()?,
            "SHARD" => self.shard(&args)?,
            "ADDPOS" => self.add_positions(&args)?,
            "GETPOS" => self.get_positions(&args)?,
            "DELPOS" => {
                let kw = arg(&args, 0, "keyword")?;
                self.open_shard()?.del(kw)?;
                ok()
            }
            "FETCH" => self.fetch(&args)?,
            "PUTMETA" => self.put_meta(&args)?,
            "GETMETA" => self.get_meta(&args)?,
            "DELMETA" => {
                let doc = arg(&args, 0, "doc")?;
                self.session()?.del_filedata(doc)?;
                ok()
            }
            "DELETE" => {
                let doc = arg(&args, 0, "doc")?;
                self.session()?.mark_deleted(doc)?;
                ok()
            }
            "UNDELETE" => {
                let doc = arg(&args, 0, "doc")?;
                self.session()?.unmark_deleted(doc)?;
                ok()
            }
            "DELETED" => {
                let doc = arg(&args, 0, "doc")?;
                let deleted = self.session()?.is_deleted(doc)?;
                let answer = if deleted { "yes" } else { "no" };
                vec![answer.to_string()]
            }
            "LIVE" => self.live(&args)?,
            "ATTR" => self.attr(&args)?,
            "COUNTS" => {
                let c = self.session()?.counts();
                vec![format!(
                    "documents={} domains={} keywords={}",
                    c.documents, c.domains, c.keywords
                )]
            }
            "SETCOUNT" => self.set_count(&args)?,
            "STALE" => {
                let found = stale_shadows(&self.config.base_dir)?;
                if found.is_empty() {
                    vec!["(none)".to_string()]
                } else {
                    found.iter().map(|p| p.display().to_string()).collect()
                }
            }
            "STATS" => {
                let mut lines = vec![format!("{:?}", self.config)];
                if let Some(s) = &self.session {
                    lines.push(format!("{s:?}"));
                }
                if let Some(s) = &self.shard {
                    lines.push(format!("{s:?}"));
                }
                lines
            }
            "HELP" => help(),
            "EXIT" | "QUIT" => {
                self.shutdown()?;
                return Ok(Flow::Exit);
            }
            other => bail!("unknown command: {other}"),
        };
        Ok(Flow::Continue(out))
    }

    /// Aborts anything still open. Uncommitted writes are discarded.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(shard) = self.shard.take() {
            if shard.mode().is_write() {
                warn!(shard_id = shard.shard_id(), "discarding uncommitted shard session");
            }
            shard.abort()?;
        }
        if let Some(session) = self.session.take() {
            if session.mode().is_write() {
                warn!("discarding uncommitted write session");
            }
            session.abort()?;
        }
        Ok(())
    }

    // -------------------- Sessions --------------------

    fn begin(&mut self, args: &[&str]) -> Result<Vec<String>> {
        if self.session.is_some() {
            bail!("a session is already open; COMMIT or ABORT it first");
        }
        let mode = match args.first().map(|m| m.to_uppercase()).as_deref() {
            Some("READ") => AccessMode::Read,
            Some("WRITE") => AccessMode::Write,
            _ => bail!("usage: BEGIN READ|WRITE"),
        };
        let session = Session::open(&self.config, mode)?;
        let documents = session.counts().documents;
        self.session = Some(session);
        Ok(vec![format!("OK (mode={mode:?}, documents={documents})")])
    }

    fn commit(&mut self) -> Result<Vec<String>> {
        let session = self.session.take().ok_or_else(no_session)?;
        if let Some(shard) = self.shard.take() {
            shard.close()?;
        }
        session.close()?;
        Ok(ok())
    }

    fn abort(&mut self) -> Result<Vec<String>> {
        let session = self.session.take().ok_or_else(no_session)?;
        if let Some(shard) = self.shard.take() {
            shard.abort()?;
        }
        session.abort()?;
        Ok(ok())
    }

    fn session(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or_else(no_session)
    }

    // -------------------- Postings --------------------

    fn shard(&mut self, args: &[&str]) -> Result<Vec<String>> {
        let shard_id: u32 = arg(args, 0, "shard")?;
        let session = self.session.as_ref().ok_or_else(no_session)?;
        if let Some(prev) = self.shard.take() {
            let prev_id = prev.shard_id();
            prev.close()
                .with_context(|| format!("failed to close shard {prev_id}"))?;
        }
        match session.open_shard(shard_id)? {
            Some(shard) => {
                let header = shard.header();
                self.shard = Some(shard);
                Ok(vec![format!(
                    "OK (pos_num={}, fileindex={}..={})",
                    header.pos_num, header.fileindex_start, header.fileindex_end
                )])
            }
            None => Ok(vec!["(nil)".to_string()]),
        }
    }

    fn open_shard(&mut self) -> Result<&mut ShardSession> {
        self.shard
            .as_mut()
            .ok_or_else(|| anyhow!("no shard selected; use SHARD <id>"))
    }

    fn add_positions(&mut self, args: &[&str]) -> Result<Vec<String>> {
        if args.len() < 3 {
            bail!("usage: ADDPOS keyword doc pos [pos ...]");
        }
        let kw: u64 = arg(args, 0, "keyword")?;
        let doc: u32 = arg(args, 1, "doc")?;
        let mut list = PostingsList::new();
        for i in 2..args.len() {
            list.add(doc, arg(args, i, "pos")?);
        }
        let shard = self.open_shard()?;
        shard.merge_list(kw, &list)?;
        shard.note_document(doc)?;
        Ok(ok())
    }

    fn get_positions(&mut self, args: &[&str]) -> Result<Vec<String>> {
        let kw: u64 = arg(args, 0, "keyword")?;
        let Some(list) = missing_as_none(self.open_shard()?.get_list(kw))? else {
            return Ok(vec!["(nil)".to_string()]);
        };
        let mut lines: Vec<String> = list
            .documents()
            .map(|doc| {
                let positions = list.positions(doc).unwrap_or_default();
                format!("{doc}: {}", join(positions))
            })
            .collect();
        lines.push(format!("({} docs)", list.len()));
        Ok(lines)
    }

    fn fetch(&mut self, args: &[&str]) -> Result<Vec<String>> {
        if args.len() < 2 {
            bail!("usage: FETCH keyword shard [shard ...]");
        }
        let kw: u64 = arg(args, 0, "keyword")?;
        let shards = (1..args.len())
            .map(|i| arg(args, i, "shard"))
            .collect::<Result<Vec<u32>>>()?;
        let mut budget = PostingsBudget::new(self.config.max_postings_query_bytes);
        let session = self.session.as_ref().ok_or_else(no_session)?;
        let found = session.collect_postings(kw, &shards, &mut budget)?;

        let mut lines: Vec<String> = found
            .iter()
            .map(|(shard_id, bytes)| format!("shard {shard_id}: {} bytes", bytes.len()))
            .collect();
        lines.push(format!("({} bytes total)", budget.used()));
        Ok(lines)
    }

    // -------------------- Metadata --------------------

    fn put_meta(&mut self, args: &[&str]) -> Result<Vec<String>> {
        if args.len() < 2 {
            bail!("usage: PUTMETA doc url [title ...]");
        }
        let doc: u64 = arg(args, 0, "doc")?;
        let title = args[2..].join(" ");
        let record = FileData {
            url: Some(args[1].to_string()),
            title: (!title.is_empty()).then_some(title),
            ..FileData::default()
        };
        self.session()?.put_filedata(doc, &record)?;
        Ok(ok())
    }

    fn get_meta(&mut self, args: &[&str]) -> Result<Vec<String>> {
        let doc: u64 = arg(args, 0, "doc")?;
        let Some(record) = missing_as_none(self.session()?.get_filedata(doc))? else {
            return Ok(vec!["(nil)".to_string()]);
        };
        Ok(vec![format!(
            "url={} title={} size={} domainid={}",
            record.url.as_deref().unwrap_or("-"),
            record.title.as_deref().unwrap_or("-"),
            record.size,
            record.domainid
        )])
    }

    fn live(&mut self, args: &[&str]) -> Result<Vec<String>> {
        let ids = (0..args.len())
            .map(|i| arg(args, i, "doc"))
            .collect::<Result<Vec<u64>>>()?;
        let session = self.session.as_mut().ok_or_else(no_session)?;
        self.cache.refresh(session);
        let live = self.cache.filter_live(ids);
        if live.is_empty() {
            return Ok(vec!["(empty)".to_string()]);
        }
        Ok(vec![join(&live)])
    }

    fn attr(&mut self, args: &[&str]) -> Result<Vec<String>> {
        let name = args.first().copied().unwrap_or_default().to_lowercase();
        let doc: u64 = arg(args, 1, "id")?;
        let set = args.len() > 2;
        let attrs = self.session()?.attributes();

        let value = match name.as_str() {
            "score" if set => {
                attrs.score.put(doc, arg(args, 2, "value")?)?;
                None
            }
            "score" => missing_as_none(attrs.score.get(doc))?.map(|v| v.to_string()),
            "size" | "domainid" | "filekeywordnum" | "urllen" | "keyword_totalnum"
            | "keyword_docsnum" => {
                let array = match name.as_str() {
                    "size" => &mut attrs.size,
                    "domainid" => &mut attrs.domainid,
                    "filekeywordnum" => &mut attrs.filekeywordnum,
                    "keyword_totalnum" => &mut attrs.keyword_totalnum,
                    "keyword_docsnum" => &mut attrs.keyword_docsnum,
                    _ => &mut attrs.urllen,
                };
                if set {
                    array.put(doc, arg(args, 2, "value")?)?;
                    None
                } else {
                    missing_as_none(array.get(doc))?.map(|v| v.to_string())
                }
            }
            _ => bail!(
                "usage: ATTR score|size|domainid|filekeywordnum|urllen|keyword_totalnum|keyword_docsnum id [value]"
            ),
        };
        if set {
            return Ok(ok());
        }
        Ok(vec![value.unwrap_or_else(|| "(nil)".to_string())])
    }

    fn set_count(&mut self, args: &[&str]) -> Result<Vec<String>> {
        let which = args.first().copied().unwrap_or_default().to_lowercase();
        let n: u64 = arg(args, 1, "count")?;
        let session = self.session()?;
        match which.as_str() {
            "documents" => session.set_document_count(n)?,
            "domains" => session.set_domain_count(n)?,
            "keywords" => session.set_keyword_count(n)?,
            _ => bail!("usage: SETCOUNT documents|domains|keywords n"),
        }
        Ok(ok())
    }
}

fn ok() -> Vec<String> {
    vec!["OK".to_string()]
}

fn no_session() -> anyhow::Error {
    anyhow!("no open session; use BEGIN READ|WRITE")
}

fn arg<T: FromStr>(args: &[&str], idx: usize, name: &str) -> Result<T> {
    let raw = args
        .get(idx)
        .ok_or_else(|| anyhow!("missing argument <{name}>"))?;
    raw.parse()
        .map_err(|_| anyhow!("invalid <{name}>: {raw}"))
}

/// Maps [`StoreError::NotFound`] to `None`, keeping every other error.
fn missing_as_none<T>(r: slot::Result<T>) -> Result<Option<T>> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn help() -> Vec<String> {
    [
        "BEGIN READ|WRITE | COMMIT | ABORT",
        "SHARD id | ADDPOS kw doc pos... | GETPOS kw | DELPOS kw | FETCH kw shard...",
        "PUTMETA doc url [title] | GETMETA doc | DELMETA doc",
        "DELETE doc | UNDELETE doc | DELETED doc | LIVE doc...",
        "ATTR name id [value] | COUNTS | SETCOUNT documents|domains|keywords n",
        "STALE | STATS | EXIT",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
