use smallvec_wrapper::{OneOrMore, XXLargeVec};

use super::{
  ANCOUNT_OFFSET, ARCOUNT_OFFSET, CompressionMap, MESSAGE_HEADER_SIZE, ProtoError, QDCOUNT_OFFSET,
  Question, Record, U16_SIZE,
};

// See section 18 of RFC 6762 for rules about DNS headers.
//
// 18.2: QR (Query/Response) Bit - must be set to 1 in response.
// 18.3: OPCODE - must be zero in response (OpcodeQuery == 0)
// 18.4: AA (Authoritative Answer) Bit - must be set to 1
//
// The following fields must all be set to 0:
//  18.5: TC (TRUNCATED) Bit
//  18.6: RD (Recursion Desired) Bit
//  18.7: RA (Recursion Available) Bit
//  18.8: Z (Zero) Bit
//  18.9: AD (Authentic Data) Bit
//  18.10: CD (Checking Disabled) Bit
//  18.11: RCODE (Response Code)
const RESPONSE_BITS: u16 = (1 << 15) // Response set to true
  | (1 << 10); // Authoritative set to true

#[derive(Debug)]
pub(crate) struct Header {
  pub(crate) id: u16,
  pub(crate) response: bool,
  pub(crate) opcode: u16,
  pub(crate) truncated: bool,
  pub(crate) response_code: u16,
}

/// A decoded inbound mDNS message.
#[derive(Debug)]
pub(crate) struct Message {
  pub(crate) header: Header,
  questions: Vec<Question>,
  answers: Vec<Record>,
  additionals: Vec<Record>,
}

impl Message {
  pub(crate) fn decode(src: &[u8]) -> Result<Self, ProtoError> {
    if src.len() < MESSAGE_HEADER_SIZE {
      return Err(ProtoError::NotEnoughData);
    }

    let id = u16::from_be_bytes([src[0], src[1]]);
    let flags = u16::from_be_bytes([src[2], src[3]]);
    let qdcount = u16::from_be_bytes([src[QDCOUNT_OFFSET], src[QDCOUNT_OFFSET + 1]]);
    let ancount = u16::from_be_bytes([src[ANCOUNT_OFFSET], src[ANCOUNT_OFFSET + 1]]);
    let nscount = u16::from_be_bytes([src[8], src[9]]);
    let arcount = u16::from_be_bytes([src[ARCOUNT_OFFSET], src[ARCOUNT_OFFSET + 1]]);

    let header = Header {
      id,
      response: flags & (1 << 15) != 0,
      opcode: (flags >> 11) & 0xF,
      truncated: flags & (1 << 9) != 0,
      response_code: flags & 0xF,
    };

    let mut off = MESSAGE_HEADER_SIZE;

    // counts come from the wire, so collect instead of preallocating
    let mut questions = Vec::new();
    for _ in 0..qdcount {
      let (q, off1) = Question::decode(src, off)?;
      off = off1;
      questions.push(q);
    }

    let mut answers = Vec::new();
    for _ in 0..ancount {
      let (record, off1) = Record::decode(src, off)?;
      off = off1;
      answers.push(record);
    }

    // the authority section carries nothing the zone uses, but it has to
    // be walked to reach the additionals
    for _ in 0..nscount {
      let (_, off1) = Record::decode(src, off)?;
      off = off1;
    }

    let mut additionals = Vec::new();
    for _ in 0..arcount {
      let (record, off1) = Record::decode(src, off)?;
      off = off1;
      additionals.push(record);
    }

    Ok(Self {
      header,
      questions,
      answers,
      additionals,
    })
  }

  #[inline]
  pub(crate) fn is_question(&self) -> bool {
    !self.header.response
  }

  #[inline]
  pub(crate) fn questions(&self) -> &[Question] {
    &self.questions
  }

  #[inline]
  pub(crate) fn answers(&self) -> &[Record] {
    &self.answers
  }

  #[allow(dead_code)]
  #[inline]
  pub(crate) fn additionals(&self) -> &[Record] {
    &self.additionals
  }

  #[inline]
  pub(crate) fn into_questions(self) -> Vec<Question> {
    self.questions
  }

  #[inline]
  pub(crate) fn into_answers(self) -> Vec<Record> {
    self.answers
  }
}

/// An outbound response: the echoed question section, the answers the
/// zone owns and the recursively resolved additionals.
pub(crate) struct Response {
  id: u16,
  questions: Vec<Question>,
  answers: OneOrMore<Record>,
  additionals: OneOrMore<Record>,
}

impl Response {
  pub(crate) fn new(
    id: u16,
    questions: Vec<Question>,
    answers: OneOrMore<Record>,
    additionals: OneOrMore<Record>,
  ) -> Self {
    Self {
      id,
      questions,
      answers,
      additionals,
    }
  }

  pub(crate) fn encode(&self) -> Result<XXLargeVec<u8>, ProtoError> {
    let mut hbuf = [0u8; MESSAGE_HEADER_SIZE];
    hbuf[0..U16_SIZE].copy_from_slice(&self.id.to_be_bytes());
    hbuf[2..2 + U16_SIZE].copy_from_slice(&RESPONSE_BITS.to_be_bytes());
    hbuf[QDCOUNT_OFFSET..QDCOUNT_OFFSET + U16_SIZE]
      .copy_from_slice(&(self.questions.len() as u16).to_be_bytes());
    hbuf[ANCOUNT_OFFSET..ANCOUNT_OFFSET + U16_SIZE]
      .copy_from_slice(&(self.answers.len() as u16).to_be_bytes());
    hbuf[ARCOUNT_OFFSET..ARCOUNT_OFFSET + U16_SIZE]
      .copy_from_slice(&(self.additionals.len() as u16).to_be_bytes());

    let mut cmap = Some(CompressionMap::new());
    let uncompressed_len = self.encoded_len();
    let mut buf = XXLargeVec::with_capacity(uncompressed_len);
    buf.resize(uncompressed_len, 0);
    buf[0..MESSAGE_HEADER_SIZE].copy_from_slice(&hbuf);
    let mut off = MESSAGE_HEADER_SIZE;

    for question in self.questions.iter() {
      off = question.encode(&mut buf, off, &mut cmap)?;
    }
    for record in self.answers.iter() {
      off = record.encode(&mut buf, off, &mut cmap, true)?;
    }
    for record in self.additionals.iter() {
      off = record.encode(&mut buf, off, &mut cmap, true)?;
    }

    buf.truncate(off);
    Ok(buf)
  }

  fn encoded_len(&self) -> usize {
    let mut l = MESSAGE_HEADER_SIZE;
    for question in self.questions.iter() {
      l += question.encoded_len();
    }
    for record in self.answers.iter().chain(self.additionals.iter()) {
      l += record.encoded_len();
    }
    l
  }
}
