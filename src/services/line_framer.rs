//! Нарезка байтового потока из pipe на строки.
//!
//! Буфер растёт без ограничения, пока не придёт перевод строки: процесс,
//! пишущий гигантскую строку без `\n`, удерживает её целиком в памяти.

/// Накопитель байтов одного потока. Между чтениями хранит не более одного
/// незавершённого фрагмента (если итератор [`Lines`] был исчерпан).
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
        }
    }

    /// Добавить прочитанные байты и получить ленивую последовательность готовых строк
    /// (без `\n`). Неполный хвост остаётся в буфере до следующего вызова.
    pub fn feed(&mut self, bytes: &[u8]) -> Lines<'_> {
        self.buf.extend_from_slice(bytes);
        Lines {
            buf: &mut self.buf,
            consumed: 0,
        }
    }

    /// Поток закрыт: вернуть всё, что осталось, включая последний фрагмент без `\n`
    pub fn finish(&mut self) -> Vec<Vec<u8>> {
        let mut lines: Vec<Vec<u8>> = Lines {
            buf: &mut self.buf,
            consumed: 0,
        }
        .collect();

        if !self.buf.is_empty() {
            lines.push(std::mem::take(&mut self.buf));
        }
        lines
    }

    /// Размер незавершённого хвоста
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Ленивый итератор строк. Отданные строки удаляются из буфера при drop.
pub struct Lines<'a> {
    buf: &'a mut Vec<u8>,
    consumed: usize,
}

impl Iterator for Lines<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.consumed..];
        let newline = rest.iter().position(|&b| b == b'\n')?;
        let line = rest[..newline].to_vec();
        self.consumed += newline + 1;
        Some(line)
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        self.buf.drain(..self.consumed);
    }
}
