use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use tokio::runtime::Runtime;

use chansel::ops::{nothing, read};
use chansel::{select, select_ready, Channel, UnboundedChannel};

const ITEMS: usize = 1_000;

fn bounded_stream(c: &mut Criterion) {
  let rt = Runtime::new().expect("tokio runtime");
  let mut group = c.benchmark_group("bounded_stream");
  group.throughput(Throughput::Elements(ITEMS as u64));

  group.bench_function("spsc_cap_64", |b| {
    b.iter(|| {
      rt.block_on(async {
        let channel = Channel::<usize, 64>::new();
        let producer = {
          let channel = channel.clone();
          tokio::spawn(async move {
            for i in 0..ITEMS {
              channel.write(i).await;
            }
          })
        };
        let mut sum = 0usize;
        for _ in 0..ITEMS {
          sum = sum.wrapping_add(channel.read().await);
        }
        producer.await.expect("producer finished");
        sum
      })
    })
  });
  group.finish();
}

fn unbounded_write_now(c: &mut Criterion) {
  let mut group = c.benchmark_group("unbounded_write_now");
  group.throughput(Throughput::Elements(ITEMS as u64));

  group.bench_function("fire_and_forget", |b| {
    b.iter(|| {
      let channel = UnboundedChannel::<usize>::new();
      for i in 0..ITEMS {
        channel.write_now(i);
      }
      let mut drained = 0usize;
      while channel.try_read().is_some() {
        drained += 1;
      }
      drained
    })
  });
  group.finish();
}

fn select_two_ready(c: &mut Criterion) {
  let rt = Runtime::new().expect("tokio runtime");
  let mut group = c.benchmark_group("select");

  group.bench_function("two_channels_one_ready", |b| {
    b.iter(|| {
      rt.block_on(async {
        let a = Channel::<usize>::new();
        let b = Channel::<usize, 1>::new();
        assert!(b.try_write(1));
        let result = select((read(&a), read(&b))).await;
        result.alternative()
      })
    })
  });

  group.bench_function("try_select_idle", |b| {
    let a = Channel::<usize, 1>::new();
    b.iter(|| {
      let result = select_ready((read(&a), nothing()));
      result.alternative()
    })
  });
  group.finish();
}

criterion_group!(benches, bounded_stream, unbounded_write_now, select_two_ready);
criterion_main!(benches);
