use winnow::ascii::{line_ending, multispace0, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, repeat_till, terminated};
use winnow::error::{ContextError, ParseError, StrContext, StrContextValue};
use winnow::token::take_while;
use winnow::{ModalResult, Parser};

#[derive(Debug)]
pub struct TraceParseError<'a>(ParseError<&'a str, ContextError>);

impl std::fmt::Display for TraceParseError<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

impl std::error::Error for TraceParseError<'_> {}

/// A memory trace in valgrind lackey format:
///
/// ```text
/// I 0400d7d4,8
///  M 0421c7f0,4
///  L 04f6b868,8
///  S 7ff0005c8,8
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFile {
    records: Vec<TraceRecord>,
}

impl<'a> TryFrom<&'a str> for TraceFile {
    type Error = TraceParseError<'a>;

    fn try_from(input: &'a str) -> Result<Self, Self::Error> {
        trace_file
            .parse(input)
            .map(|records| Self { records })
            .map_err(TraceParseError)
    }
}

impl TraceFile {
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Data accesses in trace order. Instruction fetches are skipped.
    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.records.iter().filter_map(TraceRecord::operation)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    Instruction,
    Load,
    Store,
    Modify,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub kind: Kind,
    pub address: u64,
    pub size: u32,
}

impl TraceRecord {
    pub fn operation(&self) -> Option<Operation> {
        let kind = match self.kind {
            Kind::Instruction => return None,
            Kind::Load => OpKind::Load,
            Kind::Store => OpKind::Store,
            Kind::Modify => OpKind::Modify,
        };

        Some(Operation {
            kind,
            address: self.address,
            size: self.size,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpKind {
    Load,
    Store,
    /// a load followed by a store to the same address
    Modify,
}

/// A data access handed to the simulator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OpKind,
    pub address: u64,
    /// bytes touched, not modelled by the cache
    pub size: u32,
}

impl Operation {
    pub fn new(kind: OpKind, address: u64) -> Self {
        Self {
            kind,
            address,
            size: 1,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            OpKind::Load => 'L',
            OpKind::Store => 'S',
            OpKind::Modify => 'M',
        };
        f.write_fmt(format_args!("{kind} {:x},{}", self.address, self.size))
    }
}

fn trace_file(input: &mut &str) -> ModalResult<Vec<TraceRecord>> {
    preceded(multispace0, repeat_till(0.., terminated(record, end), eof))
        .parse_next(input)
        .map(|(records, _)| records)
}

fn record(input: &mut &str) -> ModalResult<TraceRecord> {
    (
        preceded(space0, kind),
        preceded(space1, address),
        preceded(',', size),
    )
        .context(StrContext::Label("trace record"))
        .parse_next(input)
        .map(|(kind, address, size)| TraceRecord {
            kind,
            address,
            size,
        })
}

fn kind(input: &mut &str) -> ModalResult<Kind> {
    alt((
        'I'.value(Kind::Instruction),
        'L'.value(Kind::Load),
        'S'.value(Kind::Store),
        'M'.value(Kind::Modify),
    ))
    .context(StrContext::Label("operation"))
    .context(StrContext::Expected(StrContextValue::Description(
        "one of I, L, S, M",
    )))
    .parse_next(input)
}

fn address(input: &mut &str) -> ModalResult<u64> {
    preceded(
        opt(alt(("0x", "0X"))),
        take_while(1.., ('0'..='9', 'a'..='f', 'A'..='F'))
            .try_map(|s| u64::from_str_radix(s, 16)),
    )
    .context(StrContext::Label("address"))
    .context(StrContext::Expected(StrContextValue::Description(
        "a hexadecimal address of at most 64 bits",
    )))
    .parse_next(input)
}

fn size(input: &mut &str) -> ModalResult<u32> {
    take_while(1.., '0'..='9')
        .try_map(str::parse::<u32>)
        .context(StrContext::Label("size"))
        .context(StrContext::Expected(StrContextValue::Description(
            "a decimal access size",
        )))
        .parse_next(input)
}

fn end<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str, &'a str)> {
    (space0, alt((line_ending, eof)), multispace0)
        .context(StrContext::Label("newline"))
        .parse_next(input)
}
